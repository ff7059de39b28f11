//! # Syscall Surface
//!
//! One function per host-runtime entry point. The host decodes its ABI
//! (argument blocks, references, return slots) and calls these adapters
//! with typed arguments; each adapter binds a connection operation into
//! a [`TdbTransaction`], runs it through the module's transaction
//! driver, mirrors the resulting wire code into the per-process error
//! store, and reports a coarse [`ModuleStatus`].
//!
//! ## Error-code plumbing
//!
//! Entry points accept an optional `err_out` slot mirroring the host's
//! `int64` out-reference. When the slot is present the wire code is
//! written there and the module status stays `Ok` even for failed
//! operations — the guest inspects the code itself. Without the slot, a
//! failed operation degrades to `GeneralError`.
//!
//! Facility malfunctions (consensus breakdown, missing stores) are not
//! operation outcomes: they return `ModuleError`/`GeneralError` without
//! touching the error store.
//!
//! ## Result maps
//!
//! List-shaped results (table names, column names and types, read
//! columns) are returned through freshly allocated vector maps; the
//! adapter returns the map id.

use tracing::error;

use crate::error::{result_code, ModuleStatus, TdbResult, TDB_OK};
use crate::facility::HostContext;
use crate::module::TdbModule;
use crate::transaction::TdbTransaction;
use crate::types::{ColumnType, Value, ValueBatch};

/// Opens the connection for a data source.
pub fn tdb_open(module: &TdbModule, ctx: &dyn HostContext, ds_name: &str) -> ModuleStatus {
    match module.open_connection(ctx, ds_name) {
        Ok(()) => ModuleStatus::Ok,
        Err(_) => ModuleStatus::GeneralError,
    }
}

/// Closes the connection for a data source.
pub fn tdb_close(module: &TdbModule, ctx: &dyn HostContext, ds_name: &str) -> ModuleStatus {
    match module.close_connection(ctx, ds_name) {
        Ok(()) => ModuleStatus::Ok,
        Err(_) => ModuleStatus::GeneralError,
    }
}

/// Lists the tables of a data source; returns a vector map id whose
/// `names` key holds the table names.
pub fn tdb_table_names(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
) -> (ModuleStatus, Option<u64>) {
    let Some(connection) = module.connection(ctx, ds_name) else {
        return (ModuleStatus::GeneralError, None);
    };

    let mut names: Option<Vec<String>> = None;
    let outcome = {
        let mut transaction = TdbTransaction::new(|| {
            connection.tbl_names().map(|result| {
                names = Some(result);
            })
        });
        match module.execute_transaction(ctx, &mut transaction) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("transaction failed: {e:#}");
                return (ModuleStatus::ModuleError, None);
            }
        }
    };

    if !module.set_error_code(ctx, ds_name, result_code(&outcome)) {
        return (ModuleStatus::GeneralError, None);
    }
    if outcome.is_err() {
        return (ModuleStatus::GeneralError, None);
    }

    let Ok(map) = module.new_vector_map(ctx) else {
        return (ModuleStatus::GeneralError, None);
    };
    let id = {
        let mut map = map.lock();
        map.set_strings("names", names.unwrap_or_default());
        map.id()
    };
    (ModuleStatus::Ok, Some(id))
}

/// Creates a table with `ncols` columns named `"0" .. "<ncols-1>"`, all
/// of one type.
#[allow(clippy::too_many_arguments)]
pub fn tdb_tbl_create(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    type_domain: &str,
    type_name: &str,
    type_size: u64,
    ncols: u64,
    err_out: Option<&mut i64>,
) -> ModuleStatus {
    if ncols == 0 {
        return ModuleStatus::InvalidCall;
    }

    let names: Vec<String> = (0..ncols).map(|i| i.to_string()).collect();
    let types = vec![ColumnType::new(type_domain, type_name, type_size); ncols as usize];

    run_for_code(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_create(tbl, &names, &types)
    })
}

/// Creates a table from a vector map carrying `names` and `types`.
pub fn tdb_tbl_create2(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    vmap_id: u64,
    err_out: Option<&mut i64>,
) -> ModuleStatus {
    let Some(pmap) = module.vector_map(ctx, vmap_id) else {
        return ModuleStatus::GeneralError;
    };

    let (names, types) = {
        let pmap = pmap.lock();
        let Some(names) = pmap.strings("names").map(<[String]>::to_vec) else {
            error!("failed to get \"names\" string vector parameter");
            return ModuleStatus::GeneralError;
        };
        let Some(types) = pmap.types("types").map(<[ColumnType]>::to_vec) else {
            error!("failed to get \"types\" type vector parameter");
            return ModuleStatus::GeneralError;
        };
        (names, types)
    };

    run_for_code(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_create(tbl, &names, &types)
    })
}

/// Deletes a table.
pub fn tdb_tbl_delete(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> ModuleStatus {
    run_for_code(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_delete(tbl)
    })
}

/// Probes table existence.
pub fn tdb_tbl_exists(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<bool>) {
    run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_exists(tbl)
    })
}

/// Reads a table's column count.
pub fn tdb_tbl_col_count(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_col_count(tbl)
    })
}

/// Reads a table's row count.
pub fn tdb_tbl_row_count(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_row_count(tbl)
    })
}

/// Reads a table's column names into a vector map (`names` key).
pub fn tdb_tbl_col_names(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    let (status, names) = run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_col_names(tbl)
    });
    let Some(names) = names else {
        return (status, None);
    };

    let Ok(map) = module.new_vector_map(ctx) else {
        return (ModuleStatus::GeneralError, None);
    };
    let id = {
        let mut map = map.lock();
        map.set_strings("names", names);
        map.id()
    };
    (status, Some(id))
}

/// Reads a table's column types into a vector map (`types` key).
pub fn tdb_tbl_col_types(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    let (status, types) = run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.tbl_col_types(tbl)
    });
    let Some(types) = types else {
        return (status, None);
    };

    let Ok(map) = module.new_vector_map(ctx) else {
        return (ModuleStatus::GeneralError, None);
    };
    let id = {
        let mut map = map.lock();
        map.set_types("types", types);
        map.id()
    };
    (status, Some(id))
}

/// Appends one row (or column block) from a single caller buffer.
#[allow(clippy::too_many_arguments)]
pub fn tdb_insert_row(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    type_domain: &str,
    type_name: &str,
    type_size: u64,
    buffer: &[u8],
    value_as_column: bool,
    err_out: Option<&mut i64>,
) -> ModuleStatus {
    let value = Value::new(
        ColumnType::new(type_domain, type_name, type_size),
        buffer.to_vec(),
    );
    let batch = ValueBatch {
        values: vec![value],
        value_as_column,
    };

    run_for_code(module, ctx, ds_name, err_out, |connection| {
        connection.insert_row(tbl, std::slice::from_ref(&batch))
    })
}

/// Appends the batches of a vector map (`values` key, optional
/// `valueAsColumn` flag per batch).
pub fn tdb_insert_row2(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    vmap_id: u64,
    err_out: Option<&mut i64>,
) -> ModuleStatus {
    let Some(pmap) = module.vector_map(ctx, vmap_id) else {
        return ModuleStatus::GeneralError;
    };

    let batches = {
        let mut pmap = pmap.lock();
        let mut batches = Vec::with_capacity(pmap.batch_count());
        for i in 0..pmap.batch_count() {
            if !pmap.set_batch(i) {
                error!("failed to iterate parameter vector map batches");
                return ModuleStatus::GeneralError;
            }
            let Some(values) = pmap.values("values").map(<[Value]>::to_vec) else {
                error!("failed to get \"values\" value vector parameter");
                return ModuleStatus::GeneralError;
            };
            let value_as_column = match pmap.indexes("valueAsColumn") {
                Some([]) => {
                    error!("empty \"valueAsColumn\" index vector parameter");
                    return ModuleStatus::GeneralError;
                }
                Some(flags) => flags[0] != 0,
                None => false,
            };
            batches.push(ValueBatch {
                values,
                value_as_column,
            });
        }
        batches
    };

    run_for_code(module, ctx, ds_name, err_out, |connection| {
        connection.insert_row(tbl, &batches)
    })
}

/// Reads one column by ordinal into a vector map (`values` key).
pub fn tdb_read_col_by_index(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    column: u64,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    let (status, results) = run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.read_column(tbl, &[column])
    });
    publish_read_results(module, ctx, status, results)
}

/// Reads one column by name into a vector map (`values` key).
pub fn tdb_read_col_by_name(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    tbl: &str,
    column: &str,
    err_out: Option<&mut i64>,
) -> (ModuleStatus, Option<u64>) {
    let (status, results) = run_for_value(module, ctx, ds_name, err_out, |connection| {
        connection.read_column_by_name(tbl, &[column])
    });
    publish_read_results(module, ctx, status, results)
}

/// Runs a code-only operation through the transaction driver and the
/// error store.
fn run_for_code<F>(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    err_out: Option<&mut i64>,
    mut operation: F,
) -> ModuleStatus
where
    F: FnMut(&crate::connection::TdbConnection) -> TdbResult<()>,
{
    let Some(connection) = module.connection(ctx, ds_name) else {
        return ModuleStatus::GeneralError;
    };

    let outcome = {
        let mut transaction = TdbTransaction::new(|| operation(&connection));
        match module.execute_transaction(ctx, &mut transaction) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("transaction failed: {e:#}");
                return ModuleStatus::ModuleError;
            }
        }
    };

    let code = result_code(&outcome);
    if !module.set_error_code(ctx, ds_name, code) {
        return ModuleStatus::GeneralError;
    }
    match err_out {
        Some(slot) => {
            *slot = code;
            ModuleStatus::Ok
        }
        None if code != TDB_OK => ModuleStatus::GeneralError,
        None => ModuleStatus::Ok,
    }
}

/// Runs a value-producing operation through the transaction driver and
/// the error store. The value is only present for a successful outcome.
fn run_for_value<T, F>(
    module: &TdbModule,
    ctx: &dyn HostContext,
    ds_name: &str,
    err_out: Option<&mut i64>,
    mut operation: F,
) -> (ModuleStatus, Option<T>)
where
    F: FnMut(&crate::connection::TdbConnection) -> TdbResult<T>,
{
    let Some(connection) = module.connection(ctx, ds_name) else {
        return (ModuleStatus::GeneralError, None);
    };

    let mut output: Option<T> = None;
    let outcome = {
        let mut transaction = TdbTransaction::new(|| {
            operation(&connection).map(|value| {
                output = Some(value);
            })
        });
        match module.execute_transaction(ctx, &mut transaction) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("transaction failed: {e:#}");
                return (ModuleStatus::ModuleError, None);
            }
        }
    };

    let code = result_code(&outcome);
    if !module.set_error_code(ctx, ds_name, code) {
        return (ModuleStatus::GeneralError, None);
    }
    match err_out {
        Some(slot) => {
            *slot = code;
            if code != TDB_OK {
                return (ModuleStatus::Ok, None);
            }
        }
        None => {
            if code != TDB_OK {
                return (ModuleStatus::GeneralError, None);
            }
        }
    }
    (ModuleStatus::Ok, output)
}

/// Publishes per-column read results as the batches of a fresh vector
/// map.
fn publish_read_results(
    module: &TdbModule,
    ctx: &dyn HostContext,
    status: ModuleStatus,
    results: Option<Vec<Vec<Value>>>,
) -> (ModuleStatus, Option<u64>) {
    let Some(results) = results else {
        return (status, None);
    };

    let Ok(map) = module.new_vector_map(ctx) else {
        return (ModuleStatus::GeneralError, None);
    };
    let id = {
        let mut map = map.lock();
        for (i, column_values) in results.into_iter().enumerate() {
            if i > 0 {
                map.add_batch();
            }
            map.set_values("values", column_values);
        }
        map.set_batch(0);
        map.id()
    };
    (status, Some(id))
}
