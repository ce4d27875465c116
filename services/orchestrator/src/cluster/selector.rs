//! Cluster selection and in-place cluster mutation.

use std::sync::Arc;

use nodecheck_datamodel::ClusterModel;
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use super::{ClusterKey, ClusterPool, ClusterRecord};
use crate::clients::ClusterMetadataClient;
use crate::error::MetadataError;
use crate::scenario::Scenario;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("no cluster matches scenario {scenario} and it has no cluster mutator")]
    NoCompatibleCluster { scenario: String },

    #[error("no cluster left to mutate for scenario {scenario}")]
    NoMutableCluster { scenario: String },

    #[error("cluster {cluster} still does not match scenario {scenario} after mutation")]
    MutationDidNotMatch { scenario: String, cluster: String },

    #[error("updating cluster {cluster}: {error}")]
    Update {
        cluster: String,
        #[source]
        error: MetadataError,
    },
}

impl SelectError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SelectError::NoCompatibleCluster { .. } => "no_compatible_cluster",
            SelectError::NoMutableCluster { .. } => "no_mutable_cluster",
            SelectError::MutationDidNotMatch { .. } => "cluster_mutation_mismatch",
            SelectError::Update { .. } => "cluster_update_failed",
        }
    }
}

/// A cluster chosen for one scenario.
#[derive(Debug, Clone)]
pub struct Selection {
    pub record: Arc<ClusterRecord>,
    pub model: ClusterModel,
    pub key: ClusterKey,
    /// True if this selection applied the mutation.
    pub mutated: bool,
}

/// Picks or shapes a cluster for each scenario.
pub struct ClusterSelector {
    pool: Arc<ClusterPool>,
    metadata: Arc<dyn ClusterMetadataClient>,
}

impl ClusterSelector {
    pub fn new(pool: Arc<ClusterPool>, metadata: Arc<dyn ClusterMetadataClient>) -> Self {
        Self { pool, metadata }
    }

    pub fn pool(&self) -> &Arc<ClusterPool> {
        &self.pool
    }

    /// Select a cluster for `scenario` and claim it.
    ///
    /// Matching clusters are chosen at random to spread load. With no match
    /// the scenario's mutator is applied to the first cluster nobody has
    /// claimed or mutated during this run; scenarios of the same shape walk
    /// the pool in the same order, so they converge on one mutated cluster.
    /// A claim is taken under the cluster's mutation lock, so a cluster in
    /// use is never reshaped underneath its scenario.
    pub async fn select(
        &self,
        scenario: &Scenario,
        rng: &mut StdRng,
    ) -> Result<Selection, SelectError> {
        // A retry means a candidate was reshaped before we got its lock.
        // Each cluster is reshaped at most once, so this ends.
        loop {
            let mut matching = Vec::new();
            for record in self.pool.records() {
                let (model, _) = record.snapshot().await;
                if (scenario.cluster_selector)(&model) {
                    matching.push(Arc::clone(record));
                }
            }
            if matching.is_empty() {
                break;
            }

            let candidates = matching.len();
            let record = matching.swap_remove(rng.random_range(0..candidates));
            let claimed = {
                let _guard = record.lock_for_mutation().await;
                let (model, key) = record.snapshot().await;
                if (scenario.cluster_selector)(&model) {
                    record.claim();
                    Some((model, key))
                } else {
                    None
                }
            };
            let Some((model, key)) = claimed else {
                debug!(scenario = scenario.name, "Cluster reshaped before claim, selecting again");
                continue;
            };

            debug!(
                scenario = scenario.name,
                cluster = %model.name,
                candidates,
                claims = record.claim_count(),
                "Selected matching cluster"
            );
            return Ok(Selection {
                record,
                model,
                key,
                mutated: false,
            });
        }

        let Some(mutator) = scenario.cluster_mutator else {
            return Err(SelectError::NoCompatibleCluster {
                scenario: scenario.name.to_string(),
            });
        };

        for record in self.pool.records() {
            let _guard = record.lock_for_mutation().await;

            let (current, key) = record.snapshot().await;
            if (scenario.cluster_selector)(&current) {
                // Someone shaped it for us while we waited on the lock.
                record.claim();
                return Ok(Selection {
                    record: Arc::clone(record),
                    model: current,
                    key,
                    mutated: false,
                });
            }

            if record.mutation_count() > 0 || record.claim_count() > 0 {
                continue;
            }

            let mut desired = current.clone();
            mutator(&mut desired);

            info!(
                scenario = scenario.name,
                cluster = %current.name,
                network_plugin = %desired.network_plugin,
                network_policy = %desired.network_policy,
                "Mutating cluster"
            );

            let updated = self
                .metadata
                .update_cluster(&desired)
                .await
                .map_err(|error| SelectError::Update {
                    cluster: current.name.clone(),
                    error,
                })?;

            if !(scenario.cluster_selector)(&updated) {
                return Err(SelectError::MutationDidNotMatch {
                    scenario: scenario.name.to_string(),
                    cluster: updated.name,
                });
            }

            let key = record.commit_mutation(updated.clone()).await;
            record.claim();
            info!(
                scenario = scenario.name,
                cluster = %updated.name,
                generation = key.generation,
                "Cluster mutated"
            );

            return Ok(Selection {
                record: Arc::clone(record),
                model: updated,
                key,
                mutated: true,
            });
        }

        Err(SelectError::NoMutableCluster {
            scenario: scenario.name.to_string(),
        })
    }
}
