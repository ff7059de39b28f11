//! # Syscall Surface Tests
//!
//! The host-facing adapters: data-source open/close, the numbered-column
//! create variant, vector-map parameter passing, result maps for names,
//! types and column reads, and the per-process error store.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::*;
use tabledb_hdf5::error::TDB_OK;
use tabledb_hdf5::facility::memory::{MemoryDataSourceManager, MemoryHost};
use tabledb_hdf5::syscall;
use tabledb_hdf5::types::ColumnType;
use tabledb_hdf5::{ModuleStatus, TdbError, TdbModule};
use tempfile::tempdir;

fn module_with_source(dir: &Path) -> (TdbModule, MemoryHost) {
    let conf_path = dir.join("ds.conf");
    fs::write(
        &conf_path,
        format!("DatabasePath = {}\n", dir.join("db").display()),
    )
    .unwrap();
    let sources = Arc::new(MemoryDataSourceManager::new());
    sources.register("ds", conf_path);
    let module = TdbModule::new(sources, None).unwrap();
    let host = MemoryHost::with_process_id(b"p0".to_vec());
    (module, host)
}

#[test]
fn open_requires_a_configured_source() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());

    assert_eq!(
        syscall::tdb_open(&module, &host, "unknown"),
        ModuleStatus::GeneralError
    );
    assert_eq!(syscall::tdb_open(&module, &host, "ds"), ModuleStatus::Ok);
    // Idempotent per process.
    assert_eq!(syscall::tdb_open(&module, &host, "ds"), ModuleStatus::Ok);
}

#[test]
fn open_fails_on_unparseable_configuration() {
    let dir = tempdir().unwrap();
    let conf_path = dir.path().join("bad.conf");
    fs::write(&conf_path, "NoPathHere = 1\n").unwrap();
    let sources = Arc::new(MemoryDataSourceManager::new());
    sources.register("bad", conf_path);
    let module = TdbModule::new(sources, None).unwrap();
    let host = MemoryHost::new();

    assert_eq!(
        syscall::tdb_open(&module, &host, "bad"),
        ModuleStatus::GeneralError
    );
}

#[test]
fn operations_without_open_fail() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());

    let status = syscall::tdb_tbl_create(&module, &host, "ds", "t", "d", "u8", 1, 1, None);
    assert_eq!(status, ModuleStatus::GeneralError);
}

#[test]
fn numbered_column_create() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    let mut code = -1;
    let status = syscall::tdb_tbl_create(
        &module, &host, "ds", "t", "d", "u64", 8, 3, Some(&mut code),
    );
    assert_eq!((status, code), (ModuleStatus::Ok, TDB_OK));

    // Zero columns is a malformed call, not an operation failure.
    assert_eq!(
        syscall::tdb_tbl_create(&module, &host, "ds", "z", "d", "u64", 8, 0, None),
        ModuleStatus::InvalidCall
    );

    let (status, count) = syscall::tdb_tbl_col_count(&module, &host, "ds", "t", None);
    assert_eq!((status, count), (ModuleStatus::Ok, Some(3)));

    let (status, map_id) = syscall::tdb_tbl_col_names(&module, &host, "ds", "t", None);
    assert_eq!(status, ModuleStatus::Ok);
    let map = module.vector_map(&host, map_id.unwrap()).unwrap();
    assert_eq!(
        map.lock().strings("names").unwrap(),
        &["0".to_string(), "1".to_string(), "2".to_string()]
    );

    let (status, map_id) = syscall::tdb_tbl_col_types(&module, &host, "ds", "t", None);
    assert_eq!(status, ModuleStatus::Ok);
    let map = module.vector_map(&host, map_id.unwrap()).unwrap();
    assert_eq!(
        map.lock().types("types").unwrap(),
        &[
            ColumnType::new("d", "u64", 8),
            ColumnType::new("d", "u64", 8),
            ColumnType::new("d", "u64", 8),
        ]
    );
}

#[test]
fn create2_and_insert2_via_vector_maps() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    // Schema through a parameter map.
    let pmap = module.new_vector_map(&host).unwrap();
    let pmap_id = {
        let mut pmap = pmap.lock();
        pmap.set_strings("names", vec!["a".into(), "v".into()]);
        pmap.set_types("types", vec![u8_type(), str_type()]);
        pmap.id()
    };
    let mut code = -1;
    let status = syscall::tdb_tbl_create2(&module, &host, "ds", "t", pmap_id, Some(&mut code));
    assert_eq!((status, code), (ModuleStatus::Ok, TDB_OK));

    // Two rows through a two-batch value map.
    let vmap = module.new_vector_map(&host).unwrap();
    let vmap_id = {
        let mut vmap = vmap.lock();
        vmap.set_values(
            "values",
            vec![value(u8_type(), &[1]), value(str_type(), b"one")],
        );
        vmap.add_batch();
        vmap.set_values(
            "values",
            vec![value(u8_type(), &[2]), value(str_type(), b"two")],
        );
        vmap.id()
    };
    let mut code = -1;
    let status = syscall::tdb_insert_row2(&module, &host, "ds", "t", vmap_id, Some(&mut code));
    assert_eq!((status, code), (ModuleStatus::Ok, TDB_OK));

    let (status, rows) = syscall::tdb_tbl_row_count(&module, &host, "ds", "t", None);
    assert_eq!((status, rows), (ModuleStatus::Ok, Some(2)));
}

#[test]
fn scalar_insert_and_read_col() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    syscall::tdb_tbl_create(&module, &host, "ds", "t", "d", "u8", 1, 1, None);

    let mut code = -1;
    let status = syscall::tdb_insert_row(
        &module, &host, "ds", "t", "d", "u8", 1, &[0x2A], false, Some(&mut code),
    );
    assert_eq!((status, code), (ModuleStatus::Ok, TDB_OK));

    // Bulk column append through the as-column flag.
    let status = syscall::tdb_insert_row(
        &module, &host, "ds", "t", "d", "u8", 1, &[0x2B, 0x2C], true, None,
    );
    assert_eq!(status, ModuleStatus::Ok);

    let (status, map_id) = syscall::tdb_read_col_by_index(&module, &host, "ds", "t", 0, None);
    assert_eq!(status, ModuleStatus::Ok);
    let map = module.vector_map(&host, map_id.unwrap()).unwrap();
    assert_eq!(
        map.lock().values("values").unwrap(),
        &[value(u8_type(), &[0x2A, 0x2B, 0x2C])]
    );

    let (status, map_id) =
        syscall::tdb_read_col_by_name(&module, &host, "ds", "t", "0", None);
    assert_eq!(status, ModuleStatus::Ok);
    let map = module.vector_map(&host, map_id.unwrap()).unwrap();
    assert_eq!(
        map.lock().values("values").unwrap(),
        &[value(u8_type(), &[0x2A, 0x2B, 0x2C])]
    );
}

#[test]
fn table_names_through_a_result_map() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    syscall::tdb_tbl_create(&module, &host, "ds", "one", "d", "u8", 1, 1, None);
    syscall::tdb_tbl_create(&module, &host, "ds", "two", "d", "u8", 1, 1, None);

    let (status, map_id) = syscall::tdb_table_names(&module, &host, "ds");
    assert_eq!(status, ModuleStatus::Ok);
    let map = module.vector_map(&host, map_id.unwrap()).unwrap();
    let mut names = map.lock().strings("names").unwrap().to_vec();
    names.sort();
    assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
}

#[test]
fn error_store_tracks_the_last_code() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    let mut code = -1;
    let status = syscall::tdb_tbl_delete(&module, &host, "ds", "missing", Some(&mut code));
    assert_eq!(status, ModuleStatus::Ok);
    assert_eq!(code, TdbError::TableNotFound.code());
    assert_eq!(
        module.last_error_code(&host, "ds"),
        Some(TdbError::TableNotFound.code())
    );

    // Without the out-slot a failure degrades to a module error, but
    // the store still records the precise code.
    let status = syscall::tdb_tbl_delete(&module, &host, "ds", "missing", None);
    assert_eq!(status, ModuleStatus::GeneralError);
    assert_eq!(
        module.last_error_code(&host, "ds"),
        Some(TdbError::TableNotFound.code())
    );

    syscall::tdb_tbl_create(&module, &host, "ds", "t", "d", "u8", 1, 1, None);
    assert_eq!(module.last_error_code(&host, "ds"), Some(TDB_OK));
}

#[test]
fn exists_probe_and_delete_round_trip() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());
    syscall::tdb_open(&module, &host, "ds");

    let (status, exists) = syscall::tdb_tbl_exists(&module, &host, "ds", "t", None);
    assert_eq!((status, exists), (ModuleStatus::Ok, Some(false)));

    syscall::tdb_tbl_create(&module, &host, "ds", "t", "d", "u8", 1, 1, None);
    let (_, exists) = syscall::tdb_tbl_exists(&module, &host, "ds", "t", None);
    assert_eq!(exists, Some(true));

    let status = syscall::tdb_tbl_delete(&module, &host, "ds", "t", None);
    assert_eq!(status, ModuleStatus::Ok);
    let (_, exists) = syscall::tdb_tbl_exists(&module, &host, "ds", "t", None);
    assert_eq!(exists, Some(false));
}

#[test]
fn close_drops_the_process_connection() {
    let dir = tempdir().unwrap();
    let (module, host) = module_with_source(dir.path());

    syscall::tdb_open(&module, &host, "ds");
    assert!(module.connection(&host, "ds").is_some());

    assert_eq!(syscall::tdb_close(&module, &host, "ds"), ModuleStatus::Ok);
    assert!(module.connection(&host, "ds").is_none());
}
