//! # Table File Layout Constants
//!
//! Every table is a single HDF5 file with a fixed internal layout. The
//! constants here name that layout; the `connection` module is the only
//! consumer. Changing any of them breaks compatibility with existing
//! table files, so they are gathered in one place instead of being
//! scattered across the create/read/insert paths.
//!
//! ## File layout
//!
//! ```text
//! <table>.h5
//! ├── /meta                      group
//! │     [row_count]              scalar u64 attribute
//! ├── /meta/dataset_type         committed compound {domain, name, size}
//! ├── /meta/column_index_type    committed compound {name, ref, column}
//! ├── /meta/column_index         1-D extensible dataset, length = ncols
//! └── /<domain>::<name>::<size>  2-D extensible dataset per unique type
//!       [type]                   attribute of type /meta/dataset_type
//! ```
//!
//! ## Chunk sizing
//!
//! Per-type datasets are chunked `[max(1, CHUNK_SIZE / elem_size), 1]` so
//! one chunk holds roughly [`CHUNK_SIZE`] bytes of a single column. The
//! column index is chunked on its only dimension with
//! [`column_index_chunk_len`] entries per chunk.

/// Target chunk payload in bytes for every chunked dataset.
pub const CHUNK_SIZE: u64 = 4096;

/// Extension of table files inside a database directory (no leading dot).
pub const FILE_EXT: &str = "h5";

/// Path of the metadata group.
pub const META_GROUP: &str = "/meta";

/// Path of the column-index dataset.
pub const COL_INDEX_DATASET: &str = "/meta/column_index";

/// Path of the committed column-index compound type.
pub const COL_INDEX_TYPE: &str = "/meta/column_index_type";

/// Path of the committed dataset-type attribute type.
pub const DATASET_TYPE_ATTR_TYPE: &str = "/meta/dataset_type";

/// Name of the per-dataset type attribute.
pub const DATASET_TYPE_ATTR: &str = "type";

/// Name of the row-count attribute on [`META_GROUP`].
pub const ROW_COUNT_ATTR: &str = "row_count";

/// Upper bound on the length of one HDF5 error-stack message we copy out.
pub const ERR_MSG_SIZE_MAX: usize = 64;

/// Chunk length (first and only dimension) of a per-type dataset whose
/// elements are `elem_size` bytes wide.
pub const fn dataset_chunk_len(elem_size: u64) -> u64 {
    let len = CHUNK_SIZE / elem_size;
    if len == 0 {
        1
    } else {
        len
    }
}

/// Chunk length of the column-index dataset.
///
/// One entry holds an object reference, a variable-length descriptor for
/// the name and a u64 column offset.
pub const fn column_index_chunk_len(ref_size: u64, vlen_desc_size: u64) -> u64 {
    CHUNK_SIZE / (ref_size + vlen_desc_size + 8)
}
