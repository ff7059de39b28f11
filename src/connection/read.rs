//! # Column Reads
//!
//! Reads whole columns out of a table, by ordinal or by name. The name
//! variant resolves names through the column listing and delegates to
//! the ordinal path.
//!
//! A request batch may name several columns; the column index is read
//! with one point selection (points come back in selection order), the
//! requests are grouped by backing dataset, and each dataset is opened
//! once. Results are emitted in request order.
//!
//! Per column the result is a list of values: fixed-length columns come
//! back as one value holding `nrows` scalars, variable-length columns as
//! one value per row. A column of an empty table reads as a single empty
//! value of the column's type.

use std::collections::BTreeMap;
use std::os::raw::c_void;
use std::ptr;

use hashbrown::{HashMap, HashSet};
use hdf5_sys::h5i::hid_t;
use hdf5_sys::h5r::hobj_ref_t;
use hdf5_sys::h5t::hvl_t;
use tracing::error;

use crate::config::constants::{COL_INDEX_DATASET, DATASET_TYPE_ATTR};
use crate::error::{TdbError, TdbResult};
use crate::hdf5::dtypes::{column_loc_slice_type, read_type_attribute, ColumnLocRecord};
use crate::hdf5::handles::{vlen_reclaim, Attribute, Dataset, Dataspace, ObjectHandle};
use crate::hdf5::library_lock;
use crate::types::Value;

use super::introspect::get_column_count;
use super::{validate_column_names, validate_table_name, TdbConnection};

impl TdbConnection {
    /// Reads the columns at the given ordinals, in request order.
    pub fn read_column(&self, tbl: &str, columns: &[u64]) -> TdbResult<Vec<Vec<Value>>> {
        let _lib = library_lock();
        self.read_by_ordinals(tbl, columns).inspect_err(|_| {
            error!("failed to read column(s) in table \"{tbl}\"");
        })
    }

    /// Reads the columns with the given names, in request order.
    pub fn read_column_by_name<S: AsRef<str>>(
        &self,
        tbl: &str,
        columns: &[S],
    ) -> TdbResult<Vec<Vec<Value>>> {
        let _lib = library_lock();
        self.read_by_names(tbl, columns).inspect_err(|_| {
            error!("failed to read column(s) in table \"{tbl}\"");
        })
    }

    fn read_by_names<S: AsRef<str>>(
        &self,
        tbl: &str,
        columns: &[S],
    ) -> TdbResult<Vec<Vec<Value>>> {
        if columns.is_empty() {
            error!("empty batch of parameters given");
            return Err(TdbError::InvalidArgument);
        }
        validate_table_name(tbl)?;
        self.require_table(tbl)?;
        validate_column_names(columns)?;

        {
            let mut seen = HashSet::with_capacity(columns.len());
            for column in columns {
                if !seen.insert(column.as_ref()) {
                    error!("duplicate column names given");
                    return Err(TdbError::InvalidArgument);
                }
            }
        }

        let names = self.tbl_col_names(tbl)?;
        let by_name: HashMap<&str, u64> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i as u64))
            .collect();

        let mut ordinals = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.as_ref();
            match by_name.get(column) {
                Some(&ordinal) => ordinals.push(ordinal),
                None => {
                    error!("table \"{tbl}\" does not contain column \"{column}\"");
                    return Err(TdbError::InvalidArgument);
                }
            }
        }

        let file = self
            .open_table_file(tbl)
            .map_err(|e| e.io(&format!("failed to open table \"{tbl}\" file")))?;
        read_columns(file, &ordinals)
    }

    fn read_by_ordinals(&self, tbl: &str, columns: &[u64]) -> TdbResult<Vec<Vec<Value>>> {
        if columns.is_empty() {
            error!("empty batch of parameters given");
            return Err(TdbError::InvalidArgument);
        }
        validate_table_name(tbl)?;
        self.require_table(tbl)?;

        let file = self
            .open_table_file(tbl)
            .map_err(|e| e.io(&format!("failed to open table \"{tbl}\" file")))?;

        let col_count = get_column_count(file)?;
        {
            let mut seen = HashSet::with_capacity(columns.len());
            for &column in columns {
                if column >= col_count {
                    error!("column number out of range");
                    return Err(TdbError::InvalidArgument);
                }
                if !seen.insert(column) {
                    error!("duplicate column numbers given");
                    return Err(TdbError::InvalidArgument);
                }
            }
        }

        read_columns(file, columns)
    }
}

fn read_columns(file: hid_t, ordinals: &[u64]) -> TdbResult<Vec<Vec<Value>>> {
    // Resolve the ordinals to (dataset, slot) pairs with one point
    // selection over the column index.
    let locations = {
        let mem_type = column_loc_slice_type()
            .map_err(|e| e.general("failed to create column meta info type"))?;
        let mem_space = Dataspace::create_simple(&[ordinals.len() as u64], None)
            .map_err(|e| e.general("failed to create column meta info memory data space"))?;
        let dataset = Dataset::open(file, COL_INDEX_DATASET)
            .map_err(|e| e.general("failed to open column meta info dataset"))?;
        let file_space = dataset
            .space()
            .map_err(|e| e.general("failed to get column meta info data space"))?;
        file_space
            .select_elements(ordinals)
            .map_err(|e| e.general("failed to do selection in column meta info data space"))?;

        let mut records = vec![
            ColumnLocRecord {
                dataset_ref: 0,
                dataset_column: 0,
            };
            ordinals.len()
        ];
        // SAFETY: records holds one element per selected point.
        unsafe {
            dataset
                .read(
                    mem_type.id(),
                    mem_space.id(),
                    file_space.id(),
                    records.as_mut_ptr() as *mut c_void,
                )
                .map_err(|e| e.io("failed to read column meta info dataset"))?;
        }
        records
    };

    // Group the requests by backing dataset, remembering each request's
    // output slot.
    let mut by_dataset: BTreeMap<hobj_ref_t, Vec<(u64, usize)>> = BTreeMap::new();
    for (slot, location) in locations.iter().enumerate() {
        by_dataset
            .entry(location.dataset_ref)
            .or_default()
            .push((location.dataset_column, slot));
    }

    let mut results: Vec<Vec<Value>> = vec![Vec::new(); ordinals.len()];
    for (reference, params) in by_dataset {
        read_dataset_columns(file, reference, &params, &mut results)?;
    }
    Ok(results)
}

fn read_dataset_columns(
    file: hid_t,
    reference: hobj_ref_t,
    params: &[(u64, usize)],
    results: &mut [Vec<Value>],
) -> TdbResult<()> {
    debug_assert!(!params.is_empty());

    let object = ObjectHandle::dereference(file, reference)
        .map_err(|e| e.general("failed to dereference object"))?;
    if !object.is_dataset() {
        error!("invalid dataset reference object");
        return Err(TdbError::GeneralError);
    }

    let file_space = object
        .space()
        .map_err(|e| e.general("failed to get dataset data space"))?;
    let dims = file_space
        .extent::<2>()
        .map_err(|e| e.general("invalid rank for dataset data space"))?;

    for &(column, _) in params {
        if column >= dims[1] {
            error!("invalid dataset column number: out of range");
            return Err(TdbError::InvalidArgument);
        }
    }

    let attr = Attribute::open(object.id(), DATASET_TYPE_ATTR)
        .map_err(|e| e.general("failed to open dataset type attribute"))?;
    let column_type =
        read_type_attribute(&attr).map_err(|e| e.io("failed to read dataset type attribute"))?;

    let nrows = dims[0];
    for &(column, slot) in params {
        if nrows == 0 {
            results[slot].push(Value::empty(column_type.clone()));
            continue;
        }

        file_space
            .select_hyperslab(&[0, column], &[nrows, 1])
            .map_err(|e| e.general("failed to do selection in dataset data space"))?;
        let mem_space = Dataspace::create_simple(&[nrows, 1], None)
            .map_err(|e| e.general("failed to create memory data space for column data"))?;
        let dtype = object
            .dtype()
            .map_err(|e| e.general("failed to get dataset type"))?;

        if column_type.is_variable_length() {
            let mut descriptors: Vec<hvl_t> = Vec::with_capacity(nrows as usize);
            descriptors.resize_with(nrows as usize, || hvl_t {
                len: 0,
                p: ptr::null_mut(),
            });
            // SAFETY: descriptors holds nrows elements; the blobs the
            // library allocates are copied out and reclaimed below.
            unsafe {
                object
                    .read(
                        dtype.id(),
                        mem_space.id(),
                        file_space.id(),
                        descriptors.as_mut_ptr() as *mut c_void,
                    )
                    .map_err(|e| e.io("failed to read the dataset"))?;

                for descriptor in &descriptors {
                    let bytes = if descriptor.len == 0 || descriptor.p.is_null() {
                        Vec::new()
                    } else {
                        std::slice::from_raw_parts(descriptor.p as *const u8, descriptor.len)
                            .to_vec()
                    };
                    results[slot].push(Value::new(column_type.clone(), bytes));
                }

                if vlen_reclaim(&dtype, &mem_space, descriptors.as_mut_ptr() as *mut c_void)
                    .is_err()
                {
                    tracing::trace!("error while cleaning up column data");
                }
            }
        } else {
            let mut buffer = vec![0u8; (nrows * column_type.size) as usize];
            // SAFETY: buffer covers nrows x 1 elements of the opaque
            // element type.
            unsafe {
                object
                    .read(
                        dtype.id(),
                        mem_space.id(),
                        file_space.id(),
                        buffer.as_mut_ptr() as *mut c_void,
                    )
                    .map_err(|e| e.io("failed to read the dataset"))?;
            }
            results[slot].push(Value::new(column_type.clone(), buffer));
        }
    }

    Ok(())
}
