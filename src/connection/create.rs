//! # Table Creation
//!
//! Builds the complete on-disk layout of a new table in one pass: the
//! `/meta` group with its row counter, the committed attribute and
//! column-index types, one extensible dataset per unique column type and
//! the column index tying schema order to dataset slices.
//!
//! ## Creation rollback
//!
//! The file is created exclusively, then armed with a rollback guard.
//! Any error on the remaining steps drops the guard, which closes the
//! file handle and unlinks the half-built file, so a failed creation
//! leaves no trace. The guard is disarmed only after the final flush;
//! its file handle then moves into the connection's handle cache.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::fs;
use std::os::raw::c_void;
use std::path::PathBuf;

use hashbrown::HashMap;
use hdf5_sys::h5i::hid_t;
use hdf5_sys::h5s::H5S_UNLIMITED;
use hdf5_sys::h5t::{hvl_t, H5T_NATIVE_UINT64};
use hdf5_sys::h5r::hobj_ref_t;
use tracing::{debug, error, trace};

use crate::config::constants::{
    column_index_chunk_len, dataset_chunk_len, COL_INDEX_DATASET, COL_INDEX_TYPE,
    DATASET_TYPE_ATTR, DATASET_TYPE_ATTR_TYPE, META_GROUP, ROW_COUNT_ATTR,
};
use crate::error::{TdbError, TdbResult};
use crate::hdf5::dtypes::{
    column_data_type, column_index_type, elem_byte_size, type_attr_type, write_type_attribute,
    ColumnIndexRecord,
};
use crate::hdf5::handles::{
    object_reference, Attribute, Dataset, Dataspace, FileHandle, Group, PropertyList,
};
use crate::hdf5::library_lock;
use crate::types::ColumnType;

use super::{
    path_exists, validate_column_names, validate_table_name, TdbConnection,
};

/// Closes and unlinks a partially created table file unless disarmed.
struct CreateRollback {
    path: PathBuf,
    file: Option<FileHandle>,
}

impl CreateRollback {
    fn new(path: PathBuf, file: FileHandle) -> Self {
        Self {
            path,
            file: Some(file),
        }
    }

    fn file_id(&self) -> hid_t {
        self.file.as_ref().expect("rollback guard is armed").id()
    }

    fn disarm(mut self) -> FileHandle {
        self.file.take().expect("rollback guard is armed")
    }
}

impl Drop for CreateRollback {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // Close before unlink so no live handle points at a removed file.
        drop(file);
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("error while removing table file: {e}");
        }
    }
}

impl TdbConnection {
    /// Creates a table with the given schema.
    ///
    /// `names` and `types` run in parallel and define the ordered column
    /// schema; the schema is immutable afterwards. On success the new
    /// file's handle is cached on this connection.
    pub fn tbl_create(&self, tbl: &str, names: &[String], types: &[ColumnType]) -> TdbResult<()> {
        let _lib = library_lock();
        self.create_table(tbl, names, types).inspect_err(|_| {
            debug!("failed to create table \"{tbl}\"");
        })
    }

    fn create_table(&self, tbl: &str, names: &[String], types: &[ColumnType]) -> TdbResult<()> {
        if names.is_empty() {
            error!("no column names given");
            return Err(TdbError::InvalidArgument);
        }
        if types.is_empty() {
            error!("no column types given");
            return Err(TdbError::InvalidArgument);
        }
        if names.len() != types.len() {
            error!("differing number of column names and column types");
            return Err(TdbError::InvalidArgument);
        }
        validate_table_name(tbl)?;
        validate_column_names(names)?;

        {
            let mut seen = HashMap::with_capacity(names.len());
            for name in names {
                if seen.insert(name.as_str(), ()).is_some() {
                    error!("given column names must be unique");
                    return Err(TdbError::InvalidArgument);
                }
            }
        }

        // A (domain, name) pair identifies one dataset tag family; two
        // sizes under the same pair would alias the same logical type.
        {
            let mut sizes: HashMap<(&str, &str), u64> = HashMap::new();
            for column_type in types {
                let key = (column_type.domain.as_str(), column_type.name.as_str());
                match sizes.get(&key) {
                    Some(&size) if size != column_type.size => {
                        error!(
                            "column type \"{column_type}\" reused with differing sizes"
                        );
                        return Err(TdbError::InvalidArgument);
                    }
                    Some(_) => {}
                    None => {
                        sizes.insert(key, column_type.size);
                    }
                }
            }
        }

        let tbl_path = self.name_to_path(tbl);
        if path_exists(&tbl_path)? {
            error!("table already exists");
            return Err(TdbError::TableAlreadyExists);
        }

        // Drop a dangling cached handle, if any (the file may have been
        // unlinked while a handle was open).
        self.close_table_file(tbl);

        let file = FileHandle::create_exclusive(&tbl_path).map_err(|e| {
            e.io(&format!(
                "failed to create table file with path '{}'",
                tbl_path.display()
            ))
        })?;
        let rollback = CreateRollback::new(tbl_path, file);
        let file_id = rollback.file_id();

        // Deduplicate the schema types and assign each column its slot
        // within its type's dataset, in input order.
        let mut type_counts: BTreeMap<&ColumnType, u64> = BTreeMap::new();
        let mut col_info: Vec<(String, u64)> = Vec::with_capacity(types.len());
        for column_type in types {
            let count = type_counts.entry(column_type).or_insert(0);
            *count += 1;
            col_info.push((column_type.tag(), *count - 1));
        }

        // /meta group with the zero row counter.
        {
            let group = Group::create(file_id, META_GROUP)
                .map_err(|e| e.general("failed to create meta info group"))?;
            let space = Dataspace::create_simple(&[1], None)
                .map_err(|e| e.general("failed to create row count attribute data space"))?;
            let dtype = crate::hdf5::handles::Datatype::copy(*H5T_NATIVE_UINT64)
                .map_err(|e| e.general("failed to create row count attribute type"))?;
            let attr = Attribute::create(group.id(), ROW_COUNT_ATTR, &dtype, &space)
                .map_err(|e| e.general("failed to create row count attribute"))?;
            let row_count: u64 = 0;
            // SAFETY: the attribute holds one u64.
            unsafe {
                attr.write(*H5T_NATIVE_UINT64, &row_count as *const u64 as *const c_void)
                    .map_err(|e| e.general("failed to write row count attribute"))?;
            }
        }

        // One dataset per unique type, each carrying a `type` attribute
        // of the committed attribute type.
        {
            let plist = PropertyList::dataset_create().map_err(|e| {
                e.general("failed to create dataset creation property list")
            })?;

            let attr_type = type_attr_type()
                .map_err(|e| e.general("failed to create dataset type attribute type"))?;
            attr_type
                .commit(file_id, DATASET_TYPE_ATTR_TYPE)
                .map_err(|e| e.general("failed to commit dataset type attribute type"))?;

            for (&column_type, &ncols_of_type) in &type_counts {
                let tag = column_type.tag();

                let chunk = dataset_chunk_len(elem_byte_size(column_type));
                plist
                    .set_chunk(&[chunk, 1])
                    .map_err(|e| e.general("failed to set dataset chunk size"))?;

                let space = Dataspace::create_simple(
                    &[0, ncols_of_type],
                    Some(&[H5S_UNLIMITED, H5S_UNLIMITED]),
                )
                .map_err(|e| {
                    e.general(&format!("failed to create a data space for type \"{tag}\""))
                })?;

                let dtype = column_data_type(column_type)
                    .map_err(|e| e.general("failed to create dataset type"))?;
                let dataset = Dataset::create(file_id, &tag, &dtype, &space, &plist)
                    .map_err(|e| {
                        e.general(&format!("failed to create dataset for type \"{tag}\""))
                    })?;

                let attr_space = Dataspace::create_simple(&[1], None).map_err(|e| {
                    e.general("failed to create dataset type attribute data space")
                })?;
                let attr =
                    Attribute::create(dataset.id(), DATASET_TYPE_ATTR, &attr_type, &attr_space)
                        .map_err(|e| e.general("failed to create dataset type attribute"))?;
                write_type_attribute(&attr, &attr_type, column_type)
                    .map_err(|e| e.io("failed to write dataset type attribute"))?;
            }
        }

        // The column index: schema order -> (dataset reference, slot).
        {
            let index_type = column_index_type()
                .map_err(|e| e.general("failed to create column meta info data type"))?;
            index_type
                .commit(file_id, COL_INDEX_TYPE)
                .map_err(|e| e.general("failed to commit column meta info data type"))?;

            let ncols = names.len() as u64;
            let space = Dataspace::create_simple(&[ncols], Some(&[H5S_UNLIMITED]))
                .map_err(|e| e.general("failed to create column meta info data space"))?;

            let plist = PropertyList::dataset_create().map_err(|e| {
                e.general("failed to create column meta info dataset creation property list")
            })?;
            let chunk = column_index_chunk_len(
                std::mem::size_of::<hobj_ref_t>() as u64,
                std::mem::size_of::<hvl_t>() as u64,
            );
            plist.set_chunk(&[chunk]).map_err(|e| {
                e.general("failed to set column meta info dataset creation property list info")
            })?;

            let dataset = Dataset::create(file_id, COL_INDEX_DATASET, &index_type, &space, &plist)
                .map_err(|e| e.general("failed to create column meta info dataset"))?;

            // Serialize the index. The name CStrings must outlive the
            // write since the records point into them.
            let c_names: Vec<CString> = names
                .iter()
                .map(|n| CString::new(n.as_str()).map_err(|_| TdbError::InvalidArgument))
                .collect::<TdbResult<_>>()?;

            let mut records = Vec::with_capacity(names.len());
            for (c_name, (tag, within_index)) in c_names.iter().zip(&col_info) {
                let reference = object_reference(file_id, tag).map_err(|e| {
                    e.general("failed to create column meta info type reference")
                })?;
                records.push(ColumnIndexRecord {
                    name: c_name.as_ptr() as *mut _,
                    dataset_ref: reference,
                    dataset_column: *within_index,
                });
            }

            // SAFETY: records holds exactly ncols elements of the
            // committed compound; the name pointers stay alive for the
            // duration of the write.
            unsafe {
                dataset
                    .write(
                        index_type.id(),
                        hdf5_sys::h5s::H5S_ALL,
                        hdf5_sys::h5s::H5S_ALL,
                        records.as_ptr() as *const c_void,
                    )
                    .map_err(|e| e.io("failed to write column meta info dataset"))?;
            }
        }

        let file = rollback.disarm();
        if file.flush_local().is_err() {
            trace!("error while flushing buffers");
        }
        self.cache_table_file(tbl, file);

        Ok(())
    }
}
