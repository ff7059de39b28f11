//! # Connection Manager
//!
//! Hands out shared [`TdbConnection`]s, one per canonical database
//! directory. The directory named by the configuration is created if
//! missing, then canonicalised (symlinks and `..` resolved) so that two
//! spellings of the same directory share one connection.
//!
//! Connections are cached weakly: the manager never keeps a connection
//! alive on its own, and the last holder dropping its handle removes the
//! cache entry. See [`cache`] for the eviction rules.

pub mod cache;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{ensure, Result, WrapErr};
use tracing::debug;

use crate::config::TdbConnectionConf;
use crate::connection::TdbConnection;

use cache::{CacheEntry, KeyValueCache};

/// A shared handle to a connection; dereferences to [`TdbConnection`].
pub type SharedConnection = Arc<CacheEntry<PathBuf, TdbConnection>>;

/// Weak-value cache of connections keyed by canonical directory path.
#[derive(Debug, Default)]
pub struct TdbManager {
    connection_cache: KeyValueCache<PathBuf, TdbConnection>,
}

impl TdbManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or joins) the connection for the configured directory.
    pub fn open_connection(&self, config: &TdbConnectionConf) -> Result<SharedConnection> {
        let canonical = Self::resolve_directory(config)?;
        Ok(self
            .connection_cache
            .get_or_insert_with(canonical, |path| TdbConnection::new(path.clone())))
    }

    fn resolve_directory(config: &TdbConnectionConf) -> Result<PathBuf> {
        let db_path = config.database_path();

        let exists = db_path
            .try_exists()
            .wrap_err_with(|| format!("failed to probe database path '{}'", db_path.display()))?;

        if !exists {
            debug!(
                "database path does not exist, creating path '{}'",
                db_path.display()
            );
            fs::create_dir_all(db_path)
                .wrap_err_with(|| format!("failed to create path '{}'", db_path.display()))?;
        }

        let canonical = fs::canonicalize(db_path).wrap_err_with(|| {
            format!("failed to canonicalise database path '{}'", db_path.display())
        })?;
        ensure!(
            canonical.is_dir(),
            "database path '{}' exists, but is not a directory",
            db_path.display()
        );
        Ok(canonical)
    }
}
