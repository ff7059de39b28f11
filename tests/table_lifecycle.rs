//! # Table Lifecycle Tests
//!
//! Creation, introspection and read-back behavior of single tables:
//! schema round-trips, fixed- and variable-length columns, shared
//! per-type datasets, column-block inserts, duplicate-request rejection
//! and introspection idempotence.

mod common;

use common::*;
use tabledb_hdf5::{TdbError, Value, ValueBatch};
use tempfile::tempdir;

#[test]
fn create_then_introspect() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let types = vec![u8_type(), u64_type(), u8_type()];
    conn.tbl_create("t", &names, &types).unwrap();

    assert_eq!(conn.tbl_exists("t"), Ok(true));
    assert_eq!(conn.tbl_row_count("t"), Ok(0));
    assert_eq!(conn.tbl_col_count("t"), Ok(3));
    assert_eq!(conn.tbl_col_names("t").unwrap(), names);
    assert_eq!(conn.tbl_col_types("t").unwrap(), types);
}

#[test]
fn introspection_is_idempotent() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["x".into()], &[u64_type()]).unwrap();

    for _ in 0..3 {
        assert_eq!(conn.tbl_col_count("t"), Ok(1));
        assert_eq!(conn.tbl_row_count("t"), Ok(0));
        assert_eq!(conn.tbl_col_names("t").unwrap(), vec!["x".to_string()]);
        assert_eq!(conn.tbl_col_types("t").unwrap(), vec![u64_type()]);
    }
}

#[test]
fn round_trip_one_fixed_column() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();
    assert_eq!(conn.tbl_row_count("t"), Ok(0));

    conn.insert_row("t", &[row(vec![value(u8_type(), &[0x2A])])])
        .unwrap();
    assert_eq!(conn.tbl_row_count("t"), Ok(1));

    let columns = conn.read_column("t", &[0]).unwrap();
    assert_eq!(columns, vec![vec![value(u8_type(), &[0x2A])]]);
}

#[test]
fn two_columns_two_types_two_inserts() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create(
        "t",
        &["x".into(), "y".into()],
        &[u8_type(), u64_type()],
    )
    .unwrap();

    conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[0x01]),
            value(u64_type(), &[0x02, 0, 0, 0, 0, 0, 0, 0]),
        ])],
    )
    .unwrap();
    conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[0x03]),
            value(u64_type(), &[0x04, 0, 0, 0, 0, 0, 0, 0]),
        ])],
    )
    .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(2));

    // Fixed-length columns read back as one value holding all rows.
    let x = conn.read_column("t", &[0]).unwrap();
    assert_eq!(x, vec![vec![value(u8_type(), &[0x01, 0x03])]]);

    let y = conn.read_column("t", &[1]).unwrap();
    assert_eq!(
        y,
        vec![vec![value(
            u64_type(),
            &[0x02, 0, 0, 0, 0, 0, 0, 0, 0x04, 0, 0, 0, 0, 0, 0, 0],
        )]]
    );
}

#[test]
fn variable_length_column() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["v".into()], &[str_type()]).unwrap();

    conn.insert_row("t", &[row(vec![value(str_type(), b"hello")])])
        .unwrap();
    conn.insert_row("t", &[row(vec![value(str_type(), b"")])])
        .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(2));

    // Variable-length columns read back as one value per row.
    let v = conn.read_column("t", &[0]).unwrap();
    assert_eq!(
        v,
        vec![vec![value(str_type(), b"hello"), value(str_type(), b"")]]
    );
}

#[test]
fn spanning_value_as_column_block() {
    // Two u8 columns share one backing dataset with two slots. A single
    // spanning value carries two rows and is written directly in write
    // order.
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "b".into()], &[u8_type(), u8_type()])
        .unwrap();

    conn.insert_row(
        "t",
        &[column_batch(vec![value(u8_type(), &[0x10, 0x11, 0x20, 0x21])])],
    )
    .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(2));
    let a = conn.read_column("t", &[0]).unwrap();
    assert_eq!(a, vec![vec![value(u8_type(), &[0x10, 0x20])]]);
    let b = conn.read_column("t", &[1]).unwrap();
    assert_eq!(b, vec![vec![value(u8_type(), &[0x11, 0x21])]]);
}

#[test]
fn one_value_per_column_is_transposed() {
    // Same schema, but one value per column: each value is one column
    // of two rows and reads back unchanged.
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "b".into()], &[u8_type(), u8_type()])
        .unwrap();

    conn.insert_row(
        "t",
        &[column_batch(vec![
            value(u8_type(), &[0x10, 0x11]),
            value(u8_type(), &[0x20, 0x21]),
        ])],
    )
    .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(2));
    let a = conn.read_column("t", &[0]).unwrap();
    assert_eq!(a, vec![vec![value(u8_type(), &[0x10, 0x11])]]);
    let b = conn.read_column("t", &[1]).unwrap();
    assert_eq!(b, vec![vec![value(u8_type(), &[0x20, 0x21])]]);
}

#[test]
fn read_by_name_matches_read_by_ordinal() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create(
        "t",
        &["first".into(), "second".into()],
        &[u8_type(), u8_type()],
    )
    .unwrap();
    conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[0xAA]),
            value(u8_type(), &[0xBB]),
        ])],
    )
    .unwrap();

    let by_ordinal = conn.read_column("t", &[1, 0]).unwrap();
    let by_name = conn.read_column_by_name("t", &["second", "first"]).unwrap();
    assert_eq!(by_ordinal, by_name);
    assert_eq!(by_ordinal[0], vec![value(u8_type(), &[0xBB])]);
    assert_eq!(by_ordinal[1], vec![value(u8_type(), &[0xAA])]);
}

#[test]
fn duplicate_read_requests_are_rejected() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();

    assert_eq!(
        conn.read_column("t", &[0, 0]),
        Err(TdbError::InvalidArgument)
    );
    assert_eq!(
        conn.read_column_by_name("t", &["a", "a"]),
        Err(TdbError::InvalidArgument)
    );
}

#[test]
fn out_of_range_and_unknown_columns_are_rejected() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();

    assert_eq!(conn.read_column("t", &[1]), Err(TdbError::InvalidArgument));
    assert_eq!(
        conn.read_column_by_name("t", &["nope"]),
        Err(TdbError::InvalidArgument)
    );
}

#[test]
fn empty_table_reads_one_empty_value_per_column() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "v".into()], &[u8_type(), str_type()])
        .unwrap();

    let results = conn.read_column("t", &[0, 1]).unwrap();
    assert_eq!(results[0], vec![Value::empty(u8_type())]);
    assert_eq!(results[1], vec![Value::empty(str_type())]);
}

#[test]
fn schema_validation_at_create() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    // Empty schema pieces.
    assert_eq!(
        conn.tbl_create("t", &[], &[]),
        Err(TdbError::InvalidArgument)
    );
    assert_eq!(
        conn.tbl_create("t", &["a".into()], &[]),
        Err(TdbError::InvalidArgument)
    );
    // Duplicate column names.
    assert_eq!(
        conn.tbl_create("t", &["a".into(), "a".into()], &[u8_type(), u8_type()]),
        Err(TdbError::InvalidArgument)
    );
    // Name length limit.
    let long = "x".repeat(65);
    assert_eq!(
        conn.tbl_create("t", &[long], &[u8_type()]),
        Err(TdbError::InvalidArgument)
    );
    // A (domain, name) pair reused with two sizes.
    assert_eq!(
        conn.tbl_create(
            "t",
            &["a".into(), "b".into()],
            &[
                tabledb_hdf5::ColumnType::new("d", "x", 4),
                tabledb_hdf5::ColumnType::new("d", "x", 8),
            ],
        ),
        Err(TdbError::InvalidArgument)
    );
    // Empty table name.
    assert_eq!(
        conn.tbl_create("", &["a".into()], &[u8_type()]),
        Err(TdbError::InvalidArgument)
    );

    // None of the rejected schemas left a file behind.
    assert_eq!(conn.tbl_names().unwrap(), Vec::<String>::new());
}

#[test]
fn delete_then_missing() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();
    assert_eq!(conn.tbl_exists("t"), Ok(true));

    conn.tbl_delete("t").unwrap();
    assert_eq!(conn.tbl_exists("t"), Ok(false));
    assert_eq!(conn.tbl_delete("t"), Err(TdbError::TableNotFound));
    assert_eq!(conn.tbl_row_count("t"), Err(TdbError::TableNotFound));
    assert_eq!(conn.tbl_col_names("t"), Err(TdbError::TableNotFound));
}

#[test]
fn tbl_names_lists_created_tables() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("alpha", &["a".into()], &[u8_type()]).unwrap();
    conn.tbl_create("beta", &["a".into()], &[u8_type()]).unwrap();

    let mut names = conn.tbl_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn multi_batch_insert_appends_in_order() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();

    conn.insert_row(
        "t",
        &[
            ValueBatch::new(vec![value(u8_type(), &[1])]),
            ValueBatch::new(vec![value(u8_type(), &[2])]),
            ValueBatch::as_columns(vec![value(u8_type(), &[3, 4])]),
        ],
    )
    .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(4));
    let a = conn.read_column("t", &[0]).unwrap();
    assert_eq!(a, vec![vec![value(u8_type(), &[1, 2, 3, 4])]]);
}
