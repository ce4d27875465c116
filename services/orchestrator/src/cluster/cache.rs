//! Single-flight cache of cluster parameters.
//!
//! Concurrent scenarios asking for the same key share one in-flight fetch;
//! later callers get the stored value. A failed fetch stores nothing, so the
//! next caller fetches again. Entries live for the whole run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use super::{ClusterKey, ClusterParams};

type Slot = Arc<OnceCell<Arc<ClusterParams>>>;

/// Cluster parameter cache.
#[derive(Debug, Default)]
pub struct ClusterCache {
    slots: Mutex<HashMap<ClusterKey, Slot>>,
    fetches: AtomicU64,
}

impl ClusterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached parameters, if a fetch for `key` has completed.
    pub async fn get(&self, key: &ClusterKey) -> Option<Arc<ClusterParams>> {
        let slots = self.slots.lock().await;
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Cached parameters, fetching them with `fetch` on a miss.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &ClusterKey,
        fetch: F,
    ) -> Result<Arc<ClusterParams>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ClusterParams, E>>,
    {
        // The map lock is only held to find the slot, never across the fetch.
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        if let Some(params) = slot.get() {
            debug!(cluster = %key.name, generation = key.generation, "Cluster params cache hit");
            return Ok(Arc::clone(params));
        }

        let params = slot
            .get_or_try_init(|| async {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                info!(cluster = %key.name, generation = key.generation, "Fetching cluster params");
                fetch().await.map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(params))
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}
