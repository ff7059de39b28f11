//! # Row Insertion
//!
//! Appends one or more batches of values to a table. A batch supplies
//! every column of the table exactly once; batches are validated and
//! counted up front, then each backing dataset is extended and written
//! exactly once for the whole call.
//!
//! ## Batch shapes
//!
//! Within a batch, values are grouped by their column type. For a type
//! with `k` backing columns the batch may supply, for fixed-length
//! types:
//!
//! - one value per row-cell (`value_as_column = false`): every value
//!   holds `len/size` cells of a single row, one row per batch;
//! - one value per column (`value_as_column = true`, several values):
//!   every value holds one column of `r` rows; the aggregated buffer is
//!   column-major and is transposed in place before the write;
//! - one spanning value (`value_as_column = true`, single value): the
//!   value holds all `k` columns for `len/(size*k)` rows and is written
//!   directly from the caller's buffer.
//!
//! Variable-length values always carry exactly one cell each.
//!
//! ## Per-insert rollback
//!
//! Before each dataset is extended its previous extent is recorded in an
//! undo list. If any later step fails — a write, the row-count update —
//! the undo list shrinks every already-extended dataset back, so the
//! table observes either the whole insert or nothing. The row counter is
//! only advanced after every dataset write has succeeded.

use std::collections::BTreeMap;
use std::os::raw::c_void;
use std::ptr;

use hdf5_sys::h5::hsize_t;
use hdf5_sys::h5i::hid_t;
use hdf5_sys::h5r::hobj_ref_t;
use hdf5_sys::h5t::hvl_t;
use smallvec::SmallVec;
use tracing::error;

use crate::error::{TdbError, TdbResult};
use crate::hdf5::handles::{Dataspace, ObjectHandle};
use crate::hdf5::library_lock;
use crate::types::{ColumnType, Value, ValueBatch};

use super::introspect::{
    get_column_count, get_row_count, read_column_refs, resolve_ref_type, set_row_count,
};
use super::transpose::transpose_block;
use super::{validate_table_name, validate_values, TdbConnection};

/// Pre-extend shapes of the datasets touched so far, applied on drop
/// unless disarmed.
struct InsertRollback {
    file: hid_t,
    entries: SmallVec<[(hobj_ref_t, [hsize_t; 2]); 4]>,
    armed: bool,
}

impl InsertRollback {
    fn new(file: hid_t) -> Self {
        Self {
            file,
            entries: SmallVec::new(),
            armed: true,
        }
    }

    fn record(&mut self, reference: hobj_ref_t, dims: [hsize_t; 2]) {
        self.entries.push((reference, dims));
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InsertRollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for (reference, dims) in &self.entries {
            let object = match ObjectHandle::dereference(self.file, *reference) {
                Ok(object) => object,
                Err(_) => {
                    error!("error while restoring initial state: failed to open dataset reference");
                    break;
                }
            };
            if object.set_extent(dims).is_err() {
                error!("error while restoring initial state: failed to clean up changes to the table");
                break;
            }
        }
    }
}

/// The values one batch contributes to one per-type dataset.
struct TypedBlock<'a> {
    values: Vec<&'a Value>,
    as_column: bool,
    rows: u64,
}

impl TdbConnection {
    /// Appends the given batches to a table.
    ///
    /// Either every batch is fully applied or the table is left
    /// unchanged; see the module docs for the rollback contract.
    pub fn insert_row(&self, tbl: &str, batches: &[ValueBatch]) -> TdbResult<()> {
        let _lib = library_lock();
        self.insert_batches(tbl, batches).inspect_err(|_| {
            error!("failed to insert row(s) into table \"{tbl}\"");
        })
    }

    fn insert_batches(&self, tbl: &str, batches: &[ValueBatch]) -> TdbResult<()> {
        if batches.is_empty() {
            error!("no values given");
            return Err(TdbError::InvalidArgument);
        }
        validate_table_name(tbl)?;
        for batch in batches {
            if batch.values.is_empty() {
                error!("empty batch of values given");
                return Err(TdbError::InvalidArgument);
            }
            validate_values(&batch.values)?;
        }

        self.require_table(tbl)?;
        let file = self
            .open_table_file(tbl)
            .map_err(|e| e.io(&format!("failed to open table \"{tbl}\" file")))?;

        let row_count = get_row_count(file)?;
        let col_count = get_column_count(file)?;

        // Resolve the per-column dataset references to types; each
        // distinct reference is resolved once. `type_counts` holds the
        // stored column count per type.
        let refs = read_column_refs(file)?;
        let mut ref_types: Vec<(hobj_ref_t, ColumnType)> = Vec::new();
        let mut type_counts: BTreeMap<ColumnType, u64> = BTreeMap::new();
        for reference in refs {
            if let Some((_, column_type)) =
                ref_types.iter().find(|(r, _)| *r == reference)
            {
                if let Some(count) = type_counts.get_mut(column_type) {
                    *count += 1;
                }
            } else {
                let column_type = resolve_ref_type(file, reference).inspect_err(|_| {
                    error!("failed to get type info from dataset reference");
                })?;
                if type_counts.contains_key(&column_type) {
                    error!("column index references two datasets of the same type");
                    return Err(TdbError::GeneralError);
                }
                type_counts.insert(column_type.clone(), 1);
                ref_types.push((reference, column_type));
            }
        }

        // Bucket the batches by type and derive the inserted row count.
        let mut blocks: BTreeMap<ColumnType, Vec<TypedBlock<'_>>> = BTreeMap::new();
        let mut inserted_rows: u64 = 0;

        for batch in batches {
            let mut batch_types: BTreeMap<&ColumnType, Vec<&Value>> = BTreeMap::new();
            for value in &batch.values {
                let column_type = &value.column_type;
                if !type_counts.contains_key(column_type) {
                    error!("given values do not match the table schema");
                    return Err(TdbError::InvalidArgument);
                }
                batch_types.entry(column_type).or_default().push(value);
            }

            let mut batch_rows: Option<u64> = None;
            let mut batch_cols: u64 = 0;

            for (column_type, values) in &batch_types {
                let stored_cols = type_counts[*column_type];

                let (rows, cols) = if column_type.is_variable_length() {
                    // One blob per cell; arrays of blobs are unsupported,
                    // so a batch always contributes a single row of them.
                    (1, values.len() as u64)
                } else if !batch.value_as_column {
                    let cells: u64 = values
                        .iter()
                        .map(|v| v.bytes.len() as u64 / column_type.size)
                        .sum();
                    (1, cells)
                } else if values.len() == 1 {
                    // A single value spans all columns of its type.
                    let scalars = values[0].bytes.len() as u64 / column_type.size;
                    if scalars % stored_cols != 0 {
                        error!("inconsistent row count for a value batch");
                        return Err(TdbError::InvalidArgument);
                    }
                    (scalars / stored_cols, stored_cols)
                } else {
                    // One column per value; all columns agree on length.
                    let rows = values[0].bytes.len() as u64 / column_type.size;
                    for value in values {
                        if value.bytes.len() as u64 / column_type.size != rows {
                            error!("inconsistent row count for a value batch");
                            return Err(TdbError::InvalidArgument);
                        }
                    }
                    (rows, values.len() as u64)
                };

                match batch_rows {
                    None => batch_rows = Some(rows),
                    Some(existing) if existing != rows => {
                        error!("inconsistent row count for a value batch");
                        return Err(TdbError::InvalidArgument);
                    }
                    Some(_) => {}
                }

                if cols != stored_cols {
                    error!("invalid number of values for type \"{column_type}\"");
                    return Err(TdbError::InvalidArgument);
                }
                batch_cols += cols;
            }

            if batch_cols != col_count {
                error!("given number of values differs from the number of columns");
                return Err(TdbError::InvalidArgument);
            }

            // Batches are non-empty, so at least one type set the count.
            let rows = batch_rows.unwrap_or(1);
            for (column_type, values) in batch_types {
                blocks.entry(column_type.clone()).or_default().push(TypedBlock {
                    values,
                    as_column: batch.value_as_column,
                    rows,
                });
            }
            inserted_rows += rows;
        }

        // Extend and write each dataset; record the previous extent
        // first so any later failure restores it.
        let mut rollback = InsertRollback::new(file);

        for (reference, column_type) in &ref_types {
            let stored_cols = type_counts[column_type];
            let type_blocks = &blocks[column_type];

            let object = ObjectHandle::dereference(file, *reference)
                .map_err(|e| e.general("failed to get dataset from dataset reference"))?;
            let dtype = object.dtype().map_err(|e| {
                e.general(&format!("failed to get dataset type for type \"{column_type}\""))
            })?;

            let mem_space = Dataspace::create_simple(&[inserted_rows, stored_cols], None)
                .map_err(|e| {
                    e.general(&format!(
                        "failed to create memory data space for type \"{column_type}\""
                    ))
                })?;

            object
                .set_extent(&[row_count + inserted_rows, stored_cols])
                .map_err(|e| {
                    e.general(&format!("failed to extend dataset for type \"{column_type}\""))
                })?;
            rollback.record(*reference, [row_count, stored_cols]);

            let file_space = object.space().map_err(|e| {
                e.general(&format!(
                    "failed to get dataset data space for type \"{column_type}\""
                ))
            })?;
            file_space
                .select_hyperslab(&[row_count, 0], &[inserted_rows, stored_cols])
                .map_err(|e| {
                    e.general(&format!(
                        "failed to do selection in data space for type \"{column_type}\""
                    ))
                })?;

            // SAFETY: each buffer below covers exactly
            // inserted_rows x stored_cols elements of the dataset type;
            // vlen descriptors point into value buffers that outlive the
            // write.
            let write_result = unsafe {
                if column_type.is_variable_length() {
                    let mut descriptors: Vec<hvl_t> =
                        Vec::with_capacity((inserted_rows * stored_cols) as usize);
                    for block in type_blocks {
                        for value in &block.values {
                            descriptors.push(hvl_t {
                                len: value.bytes.len(),
                                p: if value.bytes.is_empty() {
                                    ptr::null_mut()
                                } else {
                                    value.bytes.as_ptr() as *mut c_void
                                },
                            });
                        }
                    }
                    debug_assert_eq!(
                        descriptors.len() as u64,
                        inserted_rows * stored_cols
                    );
                    object.write(
                        dtype.id(),
                        mem_space.id(),
                        file_space.id(),
                        descriptors.as_ptr() as *const c_void,
                    )
                } else if type_blocks.len() == 1 && type_blocks[0].values.len() == 1 {
                    // Single caller buffer, already in write order.
                    object.write(
                        dtype.id(),
                        mem_space.id(),
                        file_space.id(),
                        type_blocks[0].values[0].bytes.as_ptr() as *const c_void,
                    )
                } else {
                    let elem = column_type.size as usize;
                    let mut buffer: Vec<u8> = Vec::with_capacity(
                        (inserted_rows * stored_cols) as usize * elem,
                    );
                    for block in type_blocks {
                        let start = buffer.len();
                        for value in &block.values {
                            buffer.extend_from_slice(&value.bytes);
                        }
                        // A multi-value column block is column-major and
                        // must be flipped; spanning and per-row blocks
                        // are already row-major.
                        if block.as_column && stored_cols > 1 && block.values.len() > 1 {
                            transpose_block(&mut buffer[start..], block.rows as usize, elem);
                        }
                    }
                    object.write(
                        dtype.id(),
                        mem_space.id(),
                        file_space.id(),
                        buffer.as_ptr() as *const c_void,
                    )
                }
            };
            write_result
                .map_err(|e| e.io(&format!("failed to write values for type \"{column_type}\"")))?;
        }

        set_row_count(file, row_count + inserted_rows)?;

        // Flush to reduce the chance of file corruption.
        self.flush_table_file(tbl);

        rollback.disarm();
        Ok(())
    }
}
