//! Top-level run: one task per scenario, stop-the-world on fatal errors.
//!
//! The stop flag lives in [`RunContext`] and is flipped by the runner as
//! soon as a fatal error is raised, so queued scenarios are skipped while
//! the failing scenario is still cleaning up.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use nodecheck_id::{NameRegistry, RunId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

use crate::cluster::{ClusterCache, ClusterPool, ClusterSelector};
use crate::clients::Collaborators;
use crate::config::SuiteConfig;
use crate::error::{CloudError, MetadataError};
use crate::logs::LogLayout;
use crate::report::{RunReport, ScenarioResult, ScenarioStatus};
use crate::runner::{RunContext, ScenarioRun, ScenarioRunner};
use crate::scenario::ScenarioTable;

/// Failures before any scenario starts.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("ensuring resource group {resource_group}: {error}")]
    ResourceGroup {
        resource_group: String,
        #[source]
        error: CloudError,
    },

    #[error("listing clusters in {resource_group}: {error}")]
    ListClusters {
        resource_group: String,
        #[source]
        error: MetadataError,
    },

    #[error("no clusters found in resource group {0}")]
    NoClusters(String),

    #[error("creating log directory: {0}")]
    Logs(#[from] std::io::Error),
}

pub struct Orchestrator {
    config: Arc<SuiteConfig>,
    collaborators: Collaborators,
}

impl Orchestrator {
    pub fn new(config: SuiteConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
        }
    }

    /// Run every scenario in `table` and collect the results in table
    /// order.
    pub async fn run(&self, table: &ScenarioTable) -> Result<RunReport, OrchestratorError> {
        let run_id = RunId::new();
        let config = &self.config;
        info!(
            %run_id,
            scenarios = table.len(),
            resource_group = %config.resource_group,
            max_concurrency = config.max_concurrency,
            "Starting run"
        );

        self.collaborators
            .cloud
            .ensure_resource_group(&config.resource_group, &config.location)
            .await
            .map_err(|error| OrchestratorError::ResourceGroup {
                resource_group: config.resource_group.clone(),
                error,
            })?;

        let models = self
            .collaborators
            .clusters
            .list_clusters(&config.resource_group)
            .await
            .map_err(|error| OrchestratorError::ListClusters {
                resource_group: config.resource_group.clone(),
                error,
            })?;
        if models.is_empty() {
            return Err(OrchestratorError::NoClusters(config.resource_group.clone()));
        }
        info!(clusters = models.len(), "Cluster pool loaded");

        let pool = Arc::new(ClusterPool::new(models));
        let logs = LogLayout::create(&config.log_dir).await?;
        let (stop, _) = watch::channel(false);

        let ctx = Arc::new(RunContext {
            run_id,
            config: Arc::clone(config),
            collaborators: self.collaborators.clone(),
            selector: ClusterSelector::new(pool, Arc::clone(&self.collaborators.clusters)),
            cache: ClusterCache::new(),
            names: NameRegistry::new(),
            logs,
            stop,
        });

        let seed = config.seed.unwrap_or_else(rand::random);
        info!(seed, "Scenario RNG seed");

        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, scenario) in table.scenarios().iter().enumerate() {
            let runner = ScenarioRunner::new(Arc::clone(&ctx));
            let scenario = Arc::clone(scenario);
            let semaphore = Arc::clone(&semaphore);
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            let span = info_span!("scenario", name = scenario.name);

            tasks.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        let result = ScenarioResult::skipped(scenario.name);
                        return (index, ScenarioRun { result, fatal: None });
                    };

                    let run = match AssertUnwindSafe(runner.run(&scenario, &mut rng))
                        .catch_unwind()
                        .await
                    {
                        Ok(run) => run,
                        Err(panic) => {
                            let message = panic_message(&*panic);
                            error!(scenario = scenario.name, panic = %message, "Scenario panicked");
                            let mut result = ScenarioResult::new(scenario.name, ScenarioStatus::Failed);
                            result.reason_code = Some("panicked".to_string());
                            result.reason = Some(message);
                            ScenarioRun { result, fatal: None }
                        }
                    };
                    (index, run)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<ScenarioResult>> = vec![None; table.len()];
        let mut fatal = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, run)) => {
                    if fatal.is_none() {
                        fatal = run.fatal;
                    }
                    slots[index] = Some(run.result);
                }
                Err(e) => error!(error = %e, "Scenario task failed to join"),
            }
        }

        let results: Vec<ScenarioResult> = slots
            .into_iter()
            .zip(table.scenarios())
            .map(|(slot, scenario)| {
                slot.unwrap_or_else(|| {
                    let mut result = ScenarioResult::new(scenario.name, ScenarioStatus::Failed);
                    result.reason_code = Some("task_lost".to_string());
                    result
                })
            })
            .collect();

        let report = RunReport {
            run_id,
            results,
            fatal,
        };

        if let Some(e) = &report.fatal {
            warn!(error = %e, "Run halted by fatal error");
        }
        info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            exit_code = report.exit_code(),
            "Run finished"
        );

        Ok(report)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
