//! # tabledb-hdf5 - File-Per-Table Columnar Store over HDF5
//!
//! This crate implements the table database backend of a
//! secure-computation host: named tables with typed columns and
//! appendable rows, persisted one table per HDF5 file in a database
//! directory, with every operation optionally coordinated as a
//! cluster-wide transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Syscall Surface (syscall)         │
//! ├──────────────────────────────────────────┤
//! │   Module State (module) │ Vector Maps    │
//! ├──────────────────────────────────────────┤
//! │     Transaction Driver (transaction)     │
//! ├──────────────────────────────────────────┤
//! │  Connection Manager (manager, weak cache)│
//! ├──────────────────────────────────────────┤
//! │   Table Connection (connection)          │
//! │   create / insert / read / introspect    │
//! ├──────────────────────────────────────────┤
//! │   HDF5 Layer (hdf5: handles, dtypes)     │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Table File Layout
//!
//! A database is a directory; a table is one `.h5` file in it:
//!
//! ```text
//! <table>.h5
//! ├── /meta                      row_count attribute
//! ├── /meta/dataset_type         committed type of the `type` attributes
//! ├── /meta/column_index_type    committed type of the column index
//! ├── /meta/column_index         ordinal -> (dataset, slot) map
//! └── /<domain>::<name>::<size>  one 2-D dataset per unique column type
//! ```
//!
//! Columns of the same type share one backing dataset: a logical row is
//! a horizontal slice across all per-type datasets, kept consistent by
//! the row counter in `/meta`. Inserts are transactional per table —
//! a failed multi-dataset append shrinks every extended dataset back to
//! its prior extent.
//!
//! ## Consensus
//!
//! Deployed across a cluster, each operation runs as a proposal through
//! the host's consensus facility: all parties execute locally, the
//! result codes are reduced to one global outcome, and a party whose
//! local success disagrees with a global failure rolls back. Without a
//! consensus facility the driver degenerates to plain local execution.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tabledb_hdf5::config::TdbConnectionConf;
//! use tabledb_hdf5::manager::TdbManager;
//! use tabledb_hdf5::types::{ColumnType, Value, ValueBatch};
//!
//! let manager = TdbManager::new();
//! let conf = TdbConnectionConf::with_database_path("./db");
//! let conn = manager.open_connection(&conf)?;
//!
//! let u64_type = ColumnType::new("public", "uint64", 8);
//! conn.tbl_create("t", &["id".into()], &[u64_type.clone()])?;
//! conn.insert_row(
//!     "t",
//!     &[ValueBatch::new(vec![Value::new(u64_type, 42u64.to_le_bytes().to_vec())])],
//! )?;
//! let values = conn.read_column("t", &[0])?;
//! ```
//!
//! ## Module Overview
//!
//! - [`types`]: column types and values
//! - [`config`]: layout constants and data-source configuration
//! - [`hdf5`]: owning handle wrappers over the HDF5 C API
//! - [`connection`]: the table operations
//! - [`manager`]: weakly cached shared connections per directory
//! - [`transaction`]: consensus-coordinated transactions
//! - [`facility`]: host-facility traits and in-memory implementations
//! - [`vmap`]: batched parameter bags for the syscall surface
//! - [`module`] / [`syscall`]: the host-facing adapter layer

pub mod config;
pub mod connection;
pub mod error;
pub mod facility;
pub mod hdf5;
pub mod manager;
pub mod module;
pub mod syscall;
pub mod transaction;
pub mod types;
pub mod vmap;

pub use config::TdbConnectionConf;
pub use connection::TdbConnection;
pub use error::{ModuleStatus, TdbError, TdbResult};
pub use manager::{SharedConnection, TdbManager};
pub use module::TdbModule;
pub use transaction::TdbTransaction;
pub use types::{ColumnType, Value, ValueBatch};
