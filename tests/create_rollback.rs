//! # Creation Atomicity
//!
//! `tbl_create` either produces a complete table file or no file at
//! all. A failure after the file has been created must close the handle
//! and unlink the partial file; a pre-existing file must survive a
//! colliding create untouched.

mod common;

use std::fs;

use common::*;
use tabledb_hdf5::TdbError;
use tempfile::tempdir;

#[test]
fn interrupted_create_leaves_no_file() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    // A column name with an interior NUL passes the early validation
    // (length, uniqueness) and fails deep inside layout setup, when the
    // column index is serialized - well after the file was created.
    let result = conn.tbl_create("t", &["a\0b".into()], &[u8_type()]);
    assert_eq!(result, Err(TdbError::InvalidArgument));

    assert_eq!(conn.tbl_exists("t"), Ok(false));
    assert!(!dir.path().join("t.h5").exists());
}

#[test]
fn interrupted_create_can_be_retried() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    assert!(conn.tbl_create("t", &["a\0b".into()], &[u8_type()]).is_err());
    conn.tbl_create("t", &["ab".into()], &[u8_type()]).unwrap();
    assert_eq!(conn.tbl_exists("t"), Ok(true));
    assert_eq!(conn.tbl_col_names("t").unwrap(), vec!["ab".to_string()]);
}

#[test]
fn create_over_existing_table_preserves_the_file() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();
    conn.insert_row("t", &[row(vec![value(u8_type(), &[0x2A])])])
        .unwrap();

    let before = fs::read(dir.path().join("t.h5")).unwrap();

    let result = conn.tbl_create("t", &["other".into()], &[u64_type()]);
    assert_eq!(result, Err(TdbError::TableAlreadyExists));

    let after = fs::read(dir.path().join("t.h5")).unwrap();
    assert_eq!(before, after, "existing table file must be bit-identical");
    assert_eq!(conn.tbl_col_names("t").unwrap(), vec!["a".to_string()]);
}

#[test]
fn create_over_foreign_file_preserves_the_file() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    let foreign = dir.path().join("u.h5");
    fs::write(&foreign, b"not an hdf5 file").unwrap();

    let result = conn.tbl_create("u", &["a".into()], &[u8_type()]);
    assert_eq!(result, Err(TdbError::TableAlreadyExists));
    assert_eq!(fs::read(&foreign).unwrap(), b"not an hdf5 file");

    // The foreign file also fails the signature probe.
    assert_eq!(conn.tbl_exists("u"), Err(TdbError::GeneralError));
}
