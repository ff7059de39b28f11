//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::path::Path;

use tabledb_hdf5::{ColumnType, SharedConnection, TdbConnectionConf, TdbManager, Value, ValueBatch};

pub fn connect(dir: &Path) -> (TdbManager, SharedConnection) {
    let manager = TdbManager::new();
    let conf = TdbConnectionConf::with_database_path(dir);
    let connection = manager.open_connection(&conf).expect("open connection");
    (manager, connection)
}

pub fn u8_type() -> ColumnType {
    ColumnType::new("d", "u8", 1)
}

pub fn u64_type() -> ColumnType {
    ColumnType::new("d", "u64", 8)
}

pub fn str_type() -> ColumnType {
    ColumnType::new("d", "str", 0)
}

pub fn value(column_type: ColumnType, bytes: &[u8]) -> Value {
    Value::new(column_type, bytes.to_vec())
}

pub fn row(values: Vec<Value>) -> ValueBatch {
    ValueBatch::new(values)
}

pub fn column_batch(values: Vec<Value>) -> ValueBatch {
    ValueBatch::as_columns(values)
}
