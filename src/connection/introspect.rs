//! # Table Introspection
//!
//! Read-only views of a table: column count (the extent of the column
//! index), row count (the `/meta` attribute), column names and column
//! types (projections of the column index). The row-count setter used by
//! the insert path also lives here, next to its reader.
//!
//! Column types are stored once per backing dataset, so the type listing
//! resolves every distinct dataset reference exactly once and fans the
//! result back out to the requesting columns.

use std::os::raw::c_void;

use hashbrown::HashMap;
use hdf5_sys::h5i::hid_t;
use hdf5_sys::h5r::hobj_ref_t;
use hdf5_sys::h5s::H5S_ALL;
use hdf5_sys::h5t::H5T_NATIVE_UINT64;
use tracing::error;

use crate::config::constants::{
    COL_INDEX_DATASET, DATASET_TYPE_ATTR, META_GROUP, ROW_COUNT_ATTR,
};
use crate::error::{TdbError, TdbResult};
use crate::hdf5::dtypes::{
    column_name_slice_type, column_ref_slice_type, owned_string, read_type_attribute,
    ColumnNameRecord, ColumnRefRecord,
};
use crate::hdf5::handles::{
    vlen_reclaim, Attribute, Dataset, Dataspace, Group, ObjectHandle,
};
use crate::hdf5::library_lock;
use crate::types::ColumnType;

use super::{validate_table_name, TdbConnection};

impl TdbConnection {
    /// Number of columns in a table.
    pub fn tbl_col_count(&self, tbl: &str) -> TdbResult<u64> {
        let _lib = library_lock();
        validate_table_name(tbl)?;
        self.require_table(tbl)?;
        let file = self.open_table_file(tbl).map_err(|e| {
            e.io(&format!("failed to open table \"{tbl}\" file"))
        })?;
        get_column_count(file).inspect_err(|_| {
            error!("failed to get column count for table \"{tbl}\"");
        })
    }

    /// Number of rows in a table.
    pub fn tbl_row_count(&self, tbl: &str) -> TdbResult<u64> {
        let _lib = library_lock();
        validate_table_name(tbl)?;
        self.require_table(tbl)?;
        let file = self.open_table_file(tbl).map_err(|e| {
            e.io(&format!("failed to open table \"{tbl}\" file"))
        })?;
        get_row_count(file).inspect_err(|_| {
            error!("failed to get row count for table \"{tbl}\"");
        })
    }

    /// Column names of a table, in schema order.
    pub fn tbl_col_names(&self, tbl: &str) -> TdbResult<Vec<String>> {
        let _lib = library_lock();
        validate_table_name(tbl)?;
        self.require_table(tbl)?;
        let file = self.open_table_file(tbl).map_err(|e| {
            e.io(&format!("failed to open table \"{tbl}\" file"))
        })?;
        read_column_names(file).inspect_err(|_| {
            error!("failed to get column names for table \"{tbl}\"");
        })
    }

    /// Column types of a table, in schema order.
    pub fn tbl_col_types(&self, tbl: &str) -> TdbResult<Vec<ColumnType>> {
        let _lib = library_lock();
        validate_table_name(tbl)?;
        self.require_table(tbl)?;
        let file = self.open_table_file(tbl).map_err(|e| {
            e.io(&format!("failed to open table \"{tbl}\" file"))
        })?;
        read_column_types(file).inspect_err(|_| {
            error!("failed to get column types for table \"{tbl}\"");
        })
    }
}

/// Reads the column count off the column-index extent.
pub(crate) fn get_column_count(file: hid_t) -> TdbResult<u64> {
    let dataset = Dataset::open(file, COL_INDEX_DATASET)
        .map_err(|e| e.general("failed to open column meta info dataset"))?;
    let space = dataset
        .space()
        .map_err(|e| e.general("failed to open column meta info data space"))?;
    let [ncols] = space
        .extent::<1>()
        .map_err(|e| e.general("invalid extent for column meta info data space"))?;
    Ok(ncols)
}

/// Reads the row count from the `/meta` attribute.
pub(crate) fn get_row_count(file: hid_t) -> TdbResult<u64> {
    let group = Group::open(file, META_GROUP)
        .map_err(|e| e.general("failed to open meta info group"))?;
    let attr = Attribute::open(group.id(), ROW_COUNT_ATTR)
        .map_err(|e| e.general("failed to open row meta info attribute"))?;
    let mut nrows: u64 = 0;
    // SAFETY: the attribute holds one u64.
    unsafe {
        attr.read(*H5T_NATIVE_UINT64, &mut nrows as *mut u64 as *mut c_void)
            .map_err(|e| e.io("failed to read row meta info attribute"))?;
    }
    Ok(nrows)
}

/// Overwrites the row count in the `/meta` attribute.
pub(crate) fn set_row_count(file: hid_t, nrows: u64) -> TdbResult<()> {
    let group = Group::open(file, META_GROUP)
        .map_err(|e| e.general("failed to open meta info group"))?;
    let attr = Attribute::open(group.id(), ROW_COUNT_ATTR)
        .map_err(|e| e.general("failed to open row meta info attribute"))?;
    // SAFETY: the attribute holds one u64.
    unsafe {
        attr.write(*H5T_NATIVE_UINT64, &nrows as *const u64 as *const c_void)
            .map_err(|e| e.io("failed to write row count attribute"))?;
    }
    Ok(())
}

/// Reads the ordered dataset references out of the column index, one per
/// column.
pub(crate) fn read_column_refs(file: hid_t) -> TdbResult<Vec<hobj_ref_t>> {
    let ncols = get_column_count(file)?;

    let mem_type = column_ref_slice_type()
        .map_err(|e| e.general("failed to create column meta info type"))?;
    let dataset = Dataset::open(file, COL_INDEX_DATASET)
        .map_err(|e| e.general("failed to open column meta info dataset"))?;

    let mut records = vec![ColumnRefRecord { dataset_ref: 0 }; ncols as usize];
    // SAFETY: records holds ncols elements of the member compound; the
    // full-space read fills exactly that many.
    unsafe {
        dataset
            .read(
                mem_type.id(),
                H5S_ALL,
                H5S_ALL,
                records.as_mut_ptr() as *mut c_void,
            )
            .map_err(|e| e.io("failed to read column meta info dataset"))?;
    }
    Ok(records.into_iter().map(|r| r.dataset_ref).collect())
}

/// Resolves a dataset reference to the column type stored in its `type`
/// attribute.
pub(crate) fn resolve_ref_type(file: hid_t, reference: hobj_ref_t) -> TdbResult<ColumnType> {
    let object = ObjectHandle::dereference(file, reference)
        .map_err(|e| e.general("failed to dereference object"))?;
    if !object.is_dataset() {
        error!("invalid dataset reference object");
        return Err(TdbError::GeneralError);
    }
    let attr = Attribute::open(object.id(), DATASET_TYPE_ATTR)
        .map_err(|e| e.general("failed to open dataset type attribute"))?;
    read_type_attribute(&attr).map_err(|e| e.io("failed to read dataset type attribute"))
}

fn read_column_names(file: hid_t) -> TdbResult<Vec<String>> {
    let ncols = get_column_count(file)?;

    let mem_type = column_name_slice_type()
        .map_err(|e| e.general("failed to create column meta info type"))?;
    let mem_space = Dataspace::create_simple(&[ncols], None)
        .map_err(|e| e.general("failed to create column meta info memory data space"))?;
    let dataset = Dataset::open(file, COL_INDEX_DATASET)
        .map_err(|e| e.general("failed to open column meta info dataset"))?;

    let mut records: Vec<ColumnNameRecord> = Vec::with_capacity(ncols as usize);
    records.resize_with(ncols as usize, || ColumnNameRecord {
        name: std::ptr::null_mut(),
    });

    // SAFETY: records holds ncols name slots; the strings the library
    // allocates are copied out and reclaimed before returning.
    unsafe {
        dataset
            .read(
                mem_type.id(),
                mem_space.id(),
                H5S_ALL,
                records.as_mut_ptr() as *mut c_void,
            )
            .map_err(|e| e.io("failed to read column meta info dataset"))?;

        let names = records.iter().map(|r| owned_string(r.name)).collect();

        if vlen_reclaim(&mem_type, &mem_space, records.as_mut_ptr() as *mut c_void).is_err() {
            tracing::trace!("error while cleaning up column meta data");
        }
        Ok(names)
    }
}

fn read_column_types(file: hid_t) -> TdbResult<Vec<ColumnType>> {
    let refs = read_column_refs(file)?;

    let mut resolved: HashMap<hobj_ref_t, ColumnType> = HashMap::new();
    let mut types = Vec::with_capacity(refs.len());
    for reference in refs {
        let column_type = match resolved.get(&reference) {
            Some(t) => t.clone(),
            None => {
                let t = resolve_ref_type(file, reference).inspect_err(|_| {
                    error!("failed to get type info from dataset reference");
                })?;
                resolved.insert(reference, t.clone());
                t
            }
        };
        types.push(column_type);
    }
    Ok(types)
}
