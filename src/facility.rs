//! # Host Facilities
//!
//! The module layer consumes a small set of services from its host
//! runtime: per-process keyed data stores, a data-source registry, a
//! process identity, and an optional consensus facility. Each is a trait
//! here, so the table backend can be embedded under any host that
//! provides them.
//!
//! The `memory` module ships in-process implementations. They back the
//! test suites and are sufficient for single-party embedding: the
//! [`memory::LocalConsensusFacility`] runs proposals against the local
//! party only, and [`memory::ScriptedConsensusFacility`] simulates a
//! cluster by appending preset peer results to each proposal.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;

/// Store names used by the module layer.
pub const CONNECTIONS_STORE: &str = "mod_tabledb_hdf5/connections";
pub const VECTOR_MAPS_STORE: &str = "mod_tabledb/vector_maps";
pub const ERRORS_STORE: &str = "mod_tabledb/errors";

/// A per-process keyed store of shared values.
pub trait DataStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>>;
    fn set(&self, key: &str, value: Arc<dyn Any + Send + Sync>);
    fn remove(&self, key: &str) -> bool;
}

/// The per-process view a syscall executes under: its data stores and
/// its process identity.
pub trait HostContext {
    /// Returns the named per-process store, creating it on first use.
    fn data_store(&self, name: &str) -> Option<Arc<dyn DataStore>>;

    /// Byte identity of the logical operation's process. Identical
    /// across all parties cooperating on one operation; `None` when the
    /// host provides no process facility.
    fn process_id(&self) -> Option<Vec<u8>>;
}

/// Resolves data-source names to their configuration files.
pub trait DataSourceManager: Send + Sync {
    fn source_conf_path(&self, name: &str) -> Option<PathBuf>;
}

/// Hooks a consensus proposal calls back into while it is decided.
pub trait ProposalCallback {
    /// Runs the operation locally; returns the local wire code.
    fn execute(&mut self) -> i64;

    /// Receives every party's result code once all have executed.
    fn commit(&mut self, results: &[i64]);
}

/// Cluster-wide agreement on database operations.
pub trait ConsensusFacility: Send + Sync {
    /// Registers an operation type by name. Proposals may only be
    /// submitted for registered names.
    fn add_operation_type(&self, name: &str) -> Result<()>;

    /// Submits a proposal and blocks until the global decision is
    /// reached, driving `callback` through its hooks.
    fn blocking_propose(
        &self,
        operation: &str,
        proposal: &[u8],
        callback: &mut dyn ProposalCallback,
    ) -> Result<()>;
}

pub mod memory {
    //! In-process facility implementations.

    use std::any::Any;
    use std::path::PathBuf;
    use std::sync::Arc;

    use eyre::{ensure, Result};
    use hashbrown::{HashMap, HashSet};
    use parking_lot::Mutex;

    use super::{
        ConsensusFacility, DataSourceManager, DataStore, HostContext, ProposalCallback,
    };

    /// Hash-map backed [`DataStore`].
    #[derive(Default)]
    pub struct MemoryDataStore {
        entries: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    }

    impl DataStore for MemoryDataStore {
        fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
            self.entries.lock().get(key).cloned()
        }

        fn set(&self, key: &str, value: Arc<dyn Any + Send + Sync>) {
            self.entries.lock().insert(key.to_string(), value);
        }

        fn remove(&self, key: &str) -> bool {
            self.entries.lock().remove(key).is_some()
        }
    }

    /// A process context with lazily created stores and a fixed process
    /// identity.
    #[derive(Default)]
    pub struct MemoryHost {
        stores: Mutex<HashMap<String, Arc<MemoryDataStore>>>,
        process_id: Option<Vec<u8>>,
    }

    impl MemoryHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_process_id(process_id: Vec<u8>) -> Self {
            Self {
                stores: Mutex::new(HashMap::new()),
                process_id: Some(process_id),
            }
        }
    }

    impl HostContext for MemoryHost {
        fn data_store(&self, name: &str) -> Option<Arc<dyn DataStore>> {
            let mut stores = self.stores.lock();
            let store = stores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDataStore::default()));
            Some(Arc::clone(store) as Arc<dyn DataStore>)
        }

        fn process_id(&self) -> Option<Vec<u8>> {
            self.process_id.clone()
        }
    }

    /// Registry-backed [`DataSourceManager`].
    #[derive(Default)]
    pub struct MemoryDataSourceManager {
        sources: Mutex<HashMap<String, PathBuf>>,
    }

    impl MemoryDataSourceManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register(&self, name: impl Into<String>, conf_path: impl Into<PathBuf>) {
            self.sources.lock().insert(name.into(), conf_path.into());
        }
    }

    impl DataSourceManager for MemoryDataSourceManager {
        fn source_conf_path(&self, name: &str) -> Option<PathBuf> {
            self.sources.lock().get(name).cloned()
        }
    }

    /// Single-party consensus: every proposal is decided by the local
    /// result alone.
    #[derive(Default)]
    pub struct LocalConsensusFacility {
        operations: Mutex<HashSet<String>>,
    }

    impl LocalConsensusFacility {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ConsensusFacility for LocalConsensusFacility {
        fn add_operation_type(&self, name: &str) -> Result<()> {
            self.operations.lock().insert(name.to_string());
            Ok(())
        }

        fn blocking_propose(
            &self,
            operation: &str,
            _proposal: &[u8],
            callback: &mut dyn ProposalCallback,
        ) -> Result<()> {
            ensure!(
                self.operations.lock().contains(operation),
                "unknown consensus operation type '{operation}'"
            );
            let local = callback.execute();
            callback.commit(&[local]);
            Ok(())
        }
    }

    /// Simulated cluster: the local result is combined with a preset
    /// list of peer results before the commit hook runs.
    pub struct ScriptedConsensusFacility {
        operations: Mutex<HashSet<String>>,
        peer_results: Vec<i64>,
    }

    impl ScriptedConsensusFacility {
        pub fn new(peer_results: Vec<i64>) -> Self {
            Self {
                operations: Mutex::new(HashSet::new()),
                peer_results,
            }
        }
    }

    impl ConsensusFacility for ScriptedConsensusFacility {
        fn add_operation_type(&self, name: &str) -> Result<()> {
            self.operations.lock().insert(name.to_string());
            Ok(())
        }

        fn blocking_propose(
            &self,
            operation: &str,
            _proposal: &[u8],
            callback: &mut dyn ProposalCallback,
        ) -> Result<()> {
            ensure!(
                self.operations.lock().contains(operation),
                "unknown consensus operation type '{operation}'"
            );
            let mut results = vec![callback.execute()];
            results.extend_from_slice(&self.peer_results);
            callback.commit(&results);
            Ok(())
        }
    }
}
