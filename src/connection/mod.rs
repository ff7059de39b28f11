//! # Table Connection
//!
//! A [`TdbConnection`] owns one database directory and serves all table
//! operations against it. Each table is a single HDF5 file
//! `<table>.h5` in that directory; the connection lazily opens one file
//! handle per table and caches it until the table is deleted, the handle
//! is explicitly closed, or the connection is dropped.
//!
//! ## Operation structure
//!
//! The connection exposes the full table API and routes each call to the
//! algorithm module that implements it:
//!
//! - [`create`]: schema validation, file creation, layout setup, creation
//!   rollback
//! - [`insert`]: batched row append with per-insert undo
//! - [`read`]: column reads by ordinal or name
//! - [`introspect`]: counts, names, types
//! - this module: existence, deletion, directory scans, the file-handle
//!   cache, parameter validation
//!
//! ## Locking
//!
//! Every operation holds the process-global HDF5 library lock for its
//! duration (the C library is not thread-safe). Operations on one
//! connection are expected to be invoked serially by a single logical
//! process; the file-handle cache itself is guarded so that a connection
//! shared between processes does not corrupt its own bookkeeping.
//!
//! ## Error reporting
//!
//! Operations return codes from the closed [`TdbError`] taxonomy. When a
//! library call fails, its error stack has already been logged at
//! `trace!` by the handle layer; the operation adds one `error!` line
//! naming the step that failed. Cleanup failures on unwind paths are
//! logged and swallowed so they never mask the primary error.

mod create;
mod insert;
mod introspect;
mod read;
mod transpose;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use hdf5_sys::h5i::hid_t;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::constants::FILE_EXT;
use crate::error::{TdbError, TdbResult};
use crate::hdf5::handles::{is_hdf5_file, FileHandle, H5Error};
use crate::hdf5::library_lock;
use crate::types::{Value, COLUMN_NAME_SIZE_MAX};

/// A connection to one database directory.
///
/// Constructed by the manager (see [`crate::manager::TdbManager`]), which
/// canonicalises the directory and deduplicates live connections per
/// path.
#[derive(Debug)]
pub struct TdbConnection {
    path: PathBuf,
    table_files: Mutex<HashMap<String, FileHandle>>,
}

impl TdbConnection {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            table_files: Mutex::new(HashMap::new()),
        }
    }

    /// The database directory this connection serves.
    pub fn database_path(&self) -> &Path {
        &self.path
    }

    /// Lists the tables in the database directory.
    pub fn tbl_names(&self) -> TdbResult<Vec<String>> {
        let entries = fs::read_dir(&self.path).map_err(|e| {
            error!(
                "error while scanning database directory '{}': {e}",
                self.path.display()
            );
            TdbError::IoError
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                error!(
                    "error while scanning database directory '{}': {e}",
                    self.path.display()
                );
                TdbError::IoError
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == FILE_EXT) {
                if let Some(stem) = path.file_stem() {
                    names.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        Ok(names)
    }

    /// Deletes a table by unlinking its file. Any cached handle is
    /// dropped first.
    pub fn tbl_delete(&self, tbl: &str) -> TdbResult<()> {
        let _lib = library_lock();
        validate_table_name(tbl)?;

        self.close_table_file(tbl);

        let path = self.name_to_path(tbl);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!("table \"{tbl}\" does not exist");
                Err(TdbError::TableNotFound)
            }
            Err(e) => {
                error!(
                    "error while deleting table \"{tbl}\" file '{}': {e}",
                    path.display()
                );
                Err(TdbError::IoError)
            }
        }
    }

    /// Checks whether a table exists.
    ///
    /// A file that exists but does not carry the HDF5 signature is not a
    /// table: the check fails with `GeneralError` rather than reporting
    /// the table as absent.
    pub fn tbl_exists(&self, tbl: &str) -> TdbResult<bool> {
        let _lib = library_lock();
        validate_table_name(tbl)?;

        let path = self.name_to_path(tbl);
        if !path_exists(&path)? {
            return Ok(false);
        }

        match is_hdf5_file(&path) {
            Ok(true) => Ok(true),
            Ok(false) => {
                error!(
                    "table \"{tbl}\" file '{}' is not a valid table file",
                    path.display()
                );
                Err(TdbError::GeneralError)
            }
            Err(e) => Err(e.general("error while checking table file format")),
        }
    }

    /// Derives a table's file path: `<directory>/<table>.h5`.
    pub(crate) fn name_to_path(&self, tbl: &str) -> PathBuf {
        debug_assert!(!tbl.is_empty());
        self.path.join(format!("{tbl}.{FILE_EXT}"))
    }

    /// Returns the cached file id for a table, opening and caching the
    /// file on first use.
    ///
    /// The returned id stays valid for the duration of the current
    /// operation: handles are only dropped by `close_table_file`,
    /// `tbl_delete`, or connection drop, and all operations serialise on
    /// the library lock.
    pub(crate) fn open_table_file(&self, tbl: &str) -> Result<hid_t, H5Error> {
        debug_assert!(!tbl.is_empty());

        let mut files = self.table_files.lock();
        if let Some(handle) = files.get(tbl) {
            return Ok(handle.id());
        }

        let handle = FileHandle::open_read_write(&self.name_to_path(tbl))?;
        let id = handle.id();
        files.insert(tbl.to_string(), handle);
        Ok(id)
    }

    /// Drops the cached handle for a table, if any. Returns whether a
    /// handle was actually removed.
    pub(crate) fn close_table_file(&self, tbl: &str) -> bool {
        debug_assert!(!tbl.is_empty());
        self.table_files.lock().remove(tbl).is_some()
    }

    /// Inserts a freshly created table's handle into the cache.
    pub(crate) fn cache_table_file(&self, tbl: &str, handle: FileHandle) {
        let previous = self.table_files.lock().insert(tbl.to_string(), handle);
        debug_assert!(previous.is_none());
    }

    /// Flushes a cached table file's buffers; failures are logged and
    /// swallowed.
    pub(crate) fn flush_table_file(&self, tbl: &str) {
        if let Some(handle) = self.table_files.lock().get(tbl) {
            if handle.flush_local().is_err() {
                tracing::trace!("error while flushing buffers");
            }
        }
    }

    /// Fails with `TableNotFound` unless the table exists.
    pub(crate) fn require_table(&self, tbl: &str) -> TdbResult<()> {
        if !self.tbl_exists(tbl)? {
            error!("table \"{tbl}\" does not exist");
            return Err(TdbError::TableNotFound);
        }
        Ok(())
    }
}

impl Drop for TdbConnection {
    fn drop(&mut self) {
        let mut files = self.table_files.lock();
        if !files.is_empty() {
            debug!(
                "closing {} cached table file handle(s) for '{}'",
                files.len(),
                self.path.display()
            );
        }
        files.clear();
    }
}

pub(crate) fn validate_table_name(tbl: &str) -> TdbResult<()> {
    if tbl.is_empty() {
        error!("table name must be a non-empty string");
        return Err(TdbError::InvalidArgument);
    }
    Ok(())
}

pub(crate) fn validate_column_names<S: AsRef<str>>(names: &[S]) -> TdbResult<()> {
    for name in names {
        let name = name.as_ref();
        if name.is_empty() {
            error!("column name must be a non-empty string");
            return Err(TdbError::InvalidArgument);
        }
        if name.len() > COLUMN_NAME_SIZE_MAX {
            error!("column name too long, maximum length is {COLUMN_NAME_SIZE_MAX}");
            return Err(TdbError::InvalidArgument);
        }
    }
    Ok(())
}

pub(crate) fn validate_values(values: &[Value]) -> TdbResult<()> {
    for value in values {
        let column_type = &value.column_type;
        if column_type.is_variable_length() {
            continue;
        }
        if value.bytes.is_empty() {
            error!("invalid value of type \"{column_type}\": value size must be greater than zero");
            return Err(TdbError::InvalidArgument);
        }
        if value.bytes.len() as u64 % column_type.size != 0 {
            error!(
                "invalid value of type \"{column_type}\": value size must be a multiple of its type size"
            );
            return Err(TdbError::InvalidArgument);
        }
    }
    Ok(())
}

pub(crate) fn path_exists(path: &Path) -> TdbResult<bool> {
    path.try_exists().map_err(|e| {
        error!("error while checking if file '{}' exists: {e}", path.display());
        TdbError::GeneralError
    })
}
