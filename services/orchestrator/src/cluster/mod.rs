//! Shared cluster state for a run.
//!
//! ```text
//! ClusterPool
//! ├── ClusterRecord(c1)  model + generation + mutation lock
//! └── ClusterRecord(c2)
//! ClusterCache            (name, generation) -> ClusterParams, fetched once
//! ```
//!
//! The pool and the cache are the only state shared between scenario tasks.

mod cache;
mod selector;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use nodecheck_datamodel::{ClusterModel, NodeBootstrappingConfiguration};
use tokio::sync::{Mutex, MutexGuard, RwLock};

pub use cache::ClusterCache;
pub use selector::{ClusterSelector, SelectError, Selection};

/// Parameters derived from a cluster, cached per [`ClusterKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterParams {
    pub cluster_name: String,
    pub node_resource_group: String,
    pub subnet_id: String,
    /// Credentials for the membership client.
    pub kubeconfig: Vec<u8>,
    pub base_config: NodeBootstrappingConfiguration,
}

/// Cache key: a cluster's identity at a given mutation generation.
///
/// A mutation bumps the generation, so parameters fetched before the
/// mutation are never served for the mutated cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub name: String,
    pub generation: u64,
}

/// One cluster known to the run.
#[derive(Debug)]
pub struct ClusterRecord {
    model: RwLock<ClusterModel>,
    generation: AtomicU64,
    /// Held across the whole mutate-and-verify sequence.
    mutation_lock: Mutex<()>,
    mutations: AtomicU32,
    /// Scenarios that selected this cluster in its current shape.
    claims: AtomicU32,
}

impl ClusterRecord {
    pub fn new(model: ClusterModel) -> Self {
        Self {
            model: RwLock::new(model),
            generation: AtomicU64::new(0),
            mutation_lock: Mutex::new(()),
            mutations: AtomicU32::new(0),
            claims: AtomicU32::new(0),
        }
    }

    /// Current model and the cache key it corresponds to.
    pub async fn snapshot(&self) -> (ClusterModel, ClusterKey) {
        let model = self.model.read().await;
        let key = ClusterKey {
            name: model.name.clone(),
            generation: self.generation.load(Ordering::Acquire),
        };
        (model.clone(), key)
    }

    /// Number of mutations applied to this cluster during the run.
    pub fn mutation_count(&self) -> u32 {
        self.mutations.load(Ordering::Acquire)
    }

    /// Number of scenarios that selected this cluster during the run.
    pub fn claim_count(&self) -> u32 {
        self.claims.load(Ordering::Acquire)
    }

    /// A claimed cluster is never mutated. Caller must hold the mutation lock.
    pub(crate) fn claim(&self) {
        self.claims.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) async fn lock_for_mutation(&self) -> MutexGuard<'_, ()> {
        self.mutation_lock.lock().await
    }

    /// Store a mutated model. Caller must hold the mutation lock.
    pub(crate) async fn commit_mutation(&self, updated: ClusterModel) -> ClusterKey {
        let mut model = self.model.write().await;
        *model = updated;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.mutations.fetch_add(1, Ordering::AcqRel);
        ClusterKey {
            name: model.name.clone(),
            generation,
        }
    }
}

/// The clusters listed at the start of a run, in listing order.
#[derive(Debug, Default)]
pub struct ClusterPool {
    records: Vec<Arc<ClusterRecord>>,
}

impl ClusterPool {
    pub fn new(models: Vec<ClusterModel>) -> Self {
        Self {
            records: models
                .into_iter()
                .map(|m| Arc::new(ClusterRecord::new(m)))
                .collect(),
        }
    }

    pub fn records(&self) -> &[Arc<ClusterRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look a record up by cluster name.
    pub async fn find(&self, name: &str) -> Option<Arc<ClusterRecord>> {
        for record in &self.records {
            if record.model.read().await.name == name {
                return Some(Arc::clone(record));
            }
        }
        None
    }
}
