//! # Module State
//!
//! [`TdbModule`] is the long-lived state behind the syscall surface: the
//! connection manager, the per-data-source configuration cache, the
//! vector-map allocator and the optional consensus facility. Syscalls in
//! [`crate::syscall`] are thin adapters over the methods here.
//!
//! ## Per-process state
//!
//! Connections, vector maps and error codes are process-scoped: they
//! live in the per-process data stores reached through the
//! [`HostContext`] of the running syscall, under the store names in
//! [`crate::facility`]. The module itself holds only process-agnostic
//! state and is shared by all processes of the host.
//!
//! ## Error store
//!
//! Every data-touching syscall mirrors its operation's wire code into
//! the per-process error store under the data-source name, so guest code
//! can fetch the precise error after a failed call.

use std::path::PathBuf;
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::error;

use crate::config::TdbConnectionConf;
use crate::connection::TdbConnection;
use crate::error::TdbResult;
use crate::facility::{
    ConsensusFacility, DataSourceManager, DataStore, HostContext, CONNECTIONS_STORE, ERRORS_STORE,
    VECTOR_MAPS_STORE,
};
use crate::manager::cache::CacheEntry;
use crate::manager::{SharedConnection, TdbManager};
use crate::transaction::{self, TdbTransaction, OPERATION_NAME};
use crate::vmap::{SharedVectorMap, VectorMapUtil};

/// Shared state of the table database module.
pub struct TdbModule {
    data_source_manager: Arc<dyn DataSourceManager>,
    consensus: Option<Arc<dyn ConsensusFacility>>,
    vmap_util: VectorMapUtil,
    db_manager: TdbManager,
    ds_conf: Mutex<HashMap<String, Arc<TdbConnectionConf>>>,
}

impl TdbModule {
    /// Builds the module and registers its consensus operation type, if
    /// a consensus facility is present.
    pub fn new(
        data_source_manager: Arc<dyn DataSourceManager>,
        consensus: Option<Arc<dyn ConsensusFacility>>,
    ) -> Result<Self> {
        if let Some(facility) = &consensus {
            facility
                .add_operation_type(OPERATION_NAME)
                .wrap_err("failed to register the consensus operation type")?;
        }
        Ok(Self {
            data_source_manager,
            consensus,
            vmap_util: VectorMapUtil::new(),
            db_manager: TdbManager::new(),
            ds_conf: Mutex::new(HashMap::new()),
        })
    }

    pub fn vector_map_util(&self) -> &VectorMapUtil {
        &self.vmap_util
    }

    fn store(&self, ctx: &dyn HostContext, name: &str) -> Result<Arc<dyn DataStore>> {
        ctx.data_store(name).ok_or_else(|| {
            error!("failed to get process data store '{name}'");
            eyre!("failed to get process data store '{name}'")
        })
    }

    /// Mirrors an operation's wire code into the per-process error
    /// store.
    pub fn set_error_code(&self, ctx: &dyn HostContext, ds_name: &str, code: i64) -> bool {
        let Ok(errors) = self.store(ctx, ERRORS_STORE) else {
            return false;
        };
        errors.remove(ds_name);
        errors.set(ds_name, Arc::new(code));
        true
    }

    /// The last mirrored wire code for a data source, if any.
    pub fn last_error_code(&self, ctx: &dyn HostContext, ds_name: &str) -> Option<i64> {
        let errors = self.store(ctx, ERRORS_STORE).ok()?;
        errors.get(ds_name)?.downcast::<i64>().ok().map(|c| *c)
    }

    /// Opens the connection for a data source and stores it in the
    /// process's connection store. Idempotent per process.
    pub fn open_connection(&self, ctx: &dyn HostContext, ds_name: &str) -> Result<()> {
        let connections = self.store(ctx, CONNECTIONS_STORE)?;
        if connections.get(ds_name).is_some() {
            return Ok(());
        }

        let config = {
            let mut cached = self.ds_conf.lock();
            match cached.get(ds_name) {
                Some(config) => Arc::clone(config),
                None => {
                    let conf_path = self
                        .data_source_manager
                        .source_conf_path(ds_name)
                        .ok_or_else(|| {
                            error!("failed to get configuration for data source \"{ds_name}\"");
                            eyre!("unknown data source \"{ds_name}\"")
                        })?;
                    let config = Arc::new(TdbConnectionConf::load(&conf_path).inspect_err(
                        |e| {
                            error!(
                                "failed to parse configuration for data source \"{ds_name}\": {e:#}"
                            );
                        },
                    )?);
                    cached.insert(ds_name.to_string(), Arc::clone(&config));
                    config
                }
            }
        };

        let connection = self.db_manager.open_connection(&config)?;
        connections.set(ds_name, connection as Arc<dyn std::any::Any + Send + Sync>);
        Ok(())
    }

    /// Drops the process's connection for a data source.
    pub fn close_connection(&self, ctx: &dyn HostContext, ds_name: &str) -> Result<()> {
        let connections = self.store(ctx, CONNECTIONS_STORE)?;
        connections.remove(ds_name);
        Ok(())
    }

    /// The process's open connection for a data source.
    pub fn connection(
        &self,
        ctx: &dyn HostContext,
        ds_name: &str,
    ) -> Option<SharedConnection> {
        let connections = self.store(ctx, CONNECTIONS_STORE).ok()?;
        let connection = connections
            .get(ds_name)?
            .downcast::<CacheEntry<PathBuf, TdbConnection>>()
            .ok();
        if connection.is_none() {
            error!("no open connection for data source \"{ds_name}\"");
        }
        connection
    }

    /// Creates a vector map in the process's map store.
    pub fn new_vector_map(&self, ctx: &dyn HostContext) -> Result<SharedVectorMap> {
        let maps = self.store(ctx, VECTOR_MAPS_STORE)?;
        Ok(self.vmap_util.new_map(maps.as_ref()))
    }

    /// Looks up a vector map by id in the process's map store.
    pub fn vector_map(&self, ctx: &dyn HostContext, id: u64) -> Option<SharedVectorMap> {
        let maps = self.store(ctx, VECTOR_MAPS_STORE).ok()?;
        let map = self.vmap_util.get_map(maps.as_ref(), id);
        if map.is_none() {
            error!("no vector map with identifier {id} exists");
        }
        map
    }

    /// Removes a vector map by id; returns whether one existed.
    pub fn delete_vector_map(&self, ctx: &dyn HostContext, id: u64) -> Result<bool> {
        let maps = self.store(ctx, VECTOR_MAPS_STORE)?;
        Ok(self.vmap_util.delete_map(maps.as_ref(), id))
    }

    /// Runs a transaction through the consensus facility (or locally in
    /// degenerate mode). The outer error is a facility malfunction; the
    /// inner result is the agreed global outcome.
    pub fn execute_transaction(
        &self,
        ctx: &dyn HostContext,
        transaction: &mut TdbTransaction<'_>,
    ) -> Result<TdbResult<()>> {
        let process_id = ctx.process_id();
        transaction::execute_transaction(
            self.consensus.as_deref(),
            process_id.as_deref(),
            transaction,
        )
    }
}
