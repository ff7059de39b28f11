//! # Insert Failure Semantics
//!
//! A failed insert must leave the table exactly as it was: same row
//! count, same dataset extents, no partially visible rows. These tests
//! drive the validation failures of the insert path against pre-filled
//! tables and check the post-state through the public API (column reads
//! expose the dataset extents via value lengths).

mod common;

use common::*;
use tabledb_hdf5::{TdbError, Value};
use tempfile::tempdir;

#[test]
fn row_counts_accumulate_over_inserts() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();

    conn.insert_row("t", &[row(vec![value(u8_type(), &[1])])])
        .unwrap();
    conn.insert_row("t", &[column_batch(vec![value(u8_type(), &[2, 3, 4])])])
        .unwrap();
    conn.insert_row("t", &[row(vec![value(u8_type(), &[5])])])
        .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(5));
    let a = conn.read_column("t", &[0]).unwrap();
    assert_eq!(a, vec![vec![value(u8_type(), &[1, 2, 3, 4, 5])]]);
}

/// S5: a batch with the wrong total column count is rejected and the
/// table keeps its shape. Schema: two u8 columns (one dataset, k=2) and
/// one u64 column (k=1), pre-filled with three rows.
#[test]
fn short_batch_is_rejected_and_leaves_state() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create(
        "t",
        &["a".into(), "b".into(), "c".into()],
        &[u8_type(), u8_type(), u64_type()],
    )
    .unwrap();

    for i in 0..3u8 {
        conn.insert_row(
            "t",
            &[row(vec![
                value(u8_type(), &[i]),
                value(u8_type(), &[i + 10]),
                value(u64_type(), &[i + 20, 0, 0, 0, 0, 0, 0, 0]),
            ])],
        )
        .unwrap();
    }
    assert_eq!(conn.tbl_row_count("t"), Ok(3));

    // Two supplied columns, three expected.
    let result = conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[9]),
            value(u8_type(), &[9]),
        ])],
    );
    assert_eq!(result, Err(TdbError::InvalidArgument));

    // Post-state: row count and every column extent unchanged.
    assert_eq!(conn.tbl_row_count("t"), Ok(3));
    let cols = conn.read_column("t", &[0, 1, 2]).unwrap();
    assert_eq!(cols[0], vec![value(u8_type(), &[0, 1, 2])]);
    assert_eq!(cols[1], vec![value(u8_type(), &[10, 11, 12])]);
    assert_eq!(cols[2][0].bytes.len(), 24);
}

#[test]
fn unknown_type_is_rejected() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u8_type()]).unwrap();
    conn.insert_row("t", &[row(vec![value(u8_type(), &[7])])])
        .unwrap();

    let result = conn.insert_row("t", &[row(vec![value(u64_type(), &[0; 8])])]);
    assert_eq!(result, Err(TdbError::InvalidArgument));

    assert_eq!(conn.tbl_row_count("t"), Ok(1));
    let a = conn.read_column("t", &[0]).unwrap();
    assert_eq!(a, vec![vec![value(u8_type(), &[7])]]);
}

#[test]
fn malformed_values_are_rejected() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into()], &[u64_type()]).unwrap();

    // Empty fixed-length value.
    assert_eq!(
        conn.insert_row("t", &[row(vec![Value::new(u64_type(), vec![])])]),
        Err(TdbError::InvalidArgument)
    );
    // Length not a multiple of the type size.
    assert_eq!(
        conn.insert_row("t", &[row(vec![value(u64_type(), &[0; 7])])]),
        Err(TdbError::InvalidArgument)
    );
    // Empty batch list and empty batch.
    assert_eq!(conn.insert_row("t", &[]), Err(TdbError::InvalidArgument));
    assert_eq!(
        conn.insert_row("t", &[row(vec![])]),
        Err(TdbError::InvalidArgument)
    );

    assert_eq!(conn.tbl_row_count("t"), Ok(0));
}

#[test]
fn inconsistent_column_lengths_are_rejected() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "b".into()], &[u8_type(), u8_type()])
        .unwrap();

    // Column values of differing row counts.
    let result = conn.insert_row(
        "t",
        &[column_batch(vec![
            value(u8_type(), &[1, 2]),
            value(u8_type(), &[3]),
        ])],
    );
    assert_eq!(result, Err(TdbError::InvalidArgument));
    assert_eq!(conn.tbl_row_count("t"), Ok(0));
}

#[test]
fn spanning_value_must_cover_whole_rows() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "b".into()], &[u8_type(), u8_type()])
        .unwrap();

    // Three scalars cannot fill two columns evenly.
    let result = conn.insert_row(
        "t",
        &[column_batch(vec![value(u8_type(), &[1, 2, 3])])],
    );
    assert_eq!(result, Err(TdbError::InvalidArgument));
    assert_eq!(conn.tbl_row_count("t"), Ok(0));
}

#[test]
fn insert_into_missing_table_fails() {
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    assert_eq!(
        conn.insert_row("nope", &[row(vec![value(u8_type(), &[1])])]),
        Err(TdbError::TableNotFound)
    );
}

#[test]
fn failed_insert_then_successful_insert() {
    // The undo path must leave the table in a state later inserts can
    // build on.
    let dir = tempdir().unwrap();
    let (_mgr, conn) = connect(dir.path());

    conn.tbl_create("t", &["a".into(), "v".into()], &[u8_type(), str_type()])
        .unwrap();

    conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[1]),
            value(str_type(), b"one"),
        ])],
    )
    .unwrap();

    assert_eq!(
        conn.insert_row("t", &[row(vec![value(u8_type(), &[2])])]),
        Err(TdbError::InvalidArgument)
    );

    conn.insert_row(
        "t",
        &[row(vec![
            value(u8_type(), &[2]),
            value(str_type(), b"two"),
        ])],
    )
    .unwrap();

    assert_eq!(conn.tbl_row_count("t"), Ok(2));
    let cols = conn.read_column("t", &[0, 1]).unwrap();
    assert_eq!(cols[0], vec![value(u8_type(), &[1, 2])]);
    assert_eq!(
        cols[1],
        vec![value(str_type(), b"one"), value(str_type(), b"two")]
    );
}
