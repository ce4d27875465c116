//! Execution of a single scenario.
//!
//! ```text
//! select cluster ─> cached params ─> clone + mutate config ─> render
//!        ─> provision ─┬─ Succeeded ─────────────── diagnostics ─> health
//!                      ├─ ExpectedProvisioningError ─ diagnostics
//!                      └─ FatalError
//!        ─> delete (always)
//! ```
//!
//! Every error except [`FatalError`] is turned into a failed
//! [`ScenarioResult`] here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use nodecheck_datamodel::{ConfigHash, NodeBootstrapping, NodeBootstrappingConfiguration};
use nodecheck_id::{NameRegistry, RunId, VmssName};
use rand::rngs::StdRng;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::cluster::{ClusterCache, ClusterParams, ClusterSelector};
use crate::clients::{Collaborators, KeyPair, VmssRef, VmssSpec};
use crate::config::SuiteConfig;
use crate::diagnostics::DiagnosticsExtractor;
use crate::error::{FatalError, ScenarioError};
use crate::health::{HealthCheckResult, HealthValidator};
use crate::logs::{self, LogLayout, VMSS_ID_FILE};
use crate::provision::{Provisioner, ProvisioningOutcome};
use crate::report::{ScenarioResult, ScenarioStatus};
use crate::scenario::{default_image_id, Scenario, DEFAULT_IMAGE_KEY};

/// Tag carrying the run ID on every scale set.
pub const RUN_TAG: &str = "nodecheck-run";

/// Tag carrying the scenario name on every scale set.
pub const SCENARIO_TAG: &str = "nodecheck-scenario";

/// State shared by every scenario of a run.
pub struct RunContext {
    pub run_id: RunId,
    pub config: Arc<SuiteConfig>,
    pub collaborators: Collaborators,
    pub selector: ClusterSelector,
    pub cache: ClusterCache,
    pub names: NameRegistry,
    pub logs: LogLayout,
    /// Flips to true the moment any scenario hits a fatal error.
    pub stop: watch::Sender<bool>,
}

impl RunContext {
    pub fn halted(&self) -> bool {
        *self.stop.borrow()
    }

    /// Stop scheduling new scenarios. In-flight ones finish and clean up.
    pub fn halt(&self) {
        self.stop.send_replace(true);
    }
}

/// What one scenario produced.
#[derive(Debug)]
pub struct ScenarioRun {
    pub result: ScenarioResult,
    /// Set when the run must stop.
    pub fatal: Option<FatalError>,
}

/// Clone the base config and apply the scenario's config mutator.
///
/// The base config is never touched, so scenarios sharing a cluster can't
/// see each other's mutations.
pub fn prepare_config(
    scenario: &Scenario,
    base: &NodeBootstrappingConfiguration,
) -> Result<NodeBootstrappingConfiguration, ScenarioError> {
    let mut config = base.clone();
    scenario.mutate_config(&mut config)?;
    Ok(config)
}

/// Build the create request for a scenario, before its resource mutator.
pub fn build_vmss_spec(
    config: &SuiteConfig,
    run_id: &RunId,
    scenario: &Scenario,
    name: VmssName,
    params: &ClusterParams,
    payload: NodeBootstrapping,
    keys: &KeyPair,
) -> VmssSpec {
    let mut spec = VmssSpec {
        name,
        resource_group: params.node_resource_group.clone(),
        location: config.location.clone(),
        sku: config.vmss.sku.clone(),
        capacity: config.vmss.capacity,
        image_id: default_image_id(DEFAULT_IMAGE_KEY).unwrap_or_default(),
        subnet_id: params.subnet_id.clone(),
        admin_username: config.vmss.admin_username.clone(),
        ssh_public_key: keys.public_key.clone(),
        custom_data: payload.custom_data,
        cse: payload.cse,
        tags: BTreeMap::from([
            (RUN_TAG.to_string(), run_id.to_string()),
            (SCENARIO_TAG.to_string(), scenario.name.to_string()),
        ]),
    };
    scenario.mutate_resource(&mut spec);
    spec
}

pub struct ScenarioRunner {
    ctx: Arc<RunContext>,
}

impl ScenarioRunner {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, scenario: &Scenario, rng: &mut StdRng) -> ScenarioRun {
        let started = Instant::now();
        let mut result = ScenarioResult::new(scenario.name, ScenarioStatus::Failed);

        let outcome = self.execute(scenario, rng, &mut result).await;
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        let mut fatal = None;
        match outcome {
            Ok(health) => {
                result.status = ScenarioStatus::Passed;
                result.health = Some(health);
                info!(scenario = scenario.name, elapsed_ms = result.elapsed_ms, "Scenario passed");
            }
            Err(ScenarioError::Halted) => {
                info!(scenario = scenario.name, "Run halted, skipping scenario");
                result = ScenarioResult::skipped(scenario.name);
            }
            Err(ScenarioError::Fatal(e)) => {
                error!(scenario = scenario.name, error = %e, "Fatal error, halting run");
                result.reason_code = Some(e.reason_code().to_string());
                result.reason = Some(e.to_string());
                fatal = Some(e);
            }
            Err(e) => {
                warn!(scenario = scenario.name, reason = e.reason_code(), error = %e, "Scenario failed");
                result.reason_code = Some(e.reason_code().to_string());
                result.reason = Some(e.to_string());
            }
        }

        ScenarioRun { result, fatal }
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        rng: &mut StdRng,
        result: &mut ScenarioResult,
    ) -> Result<HealthCheckResult, ScenarioError> {
        let ctx = &self.ctx;
        if ctx.halted() {
            return Err(ScenarioError::Halted);
        }

        let selection = ctx.selector.select(scenario, rng).await?;
        let cluster_name = selection.model.name.clone();
        result.cluster = Some(cluster_name.clone());
        info!(
            scenario = scenario.name,
            cluster = %cluster_name,
            generation = selection.key.generation,
            mutated = selection.mutated,
            "Cluster selected"
        );

        let clusters = Arc::clone(&ctx.collaborators.clusters);
        let model = &selection.model;
        let params = ctx
            .cache
            .get_or_fetch(&selection.key, || async move {
                clusters.get_cluster_params(model).await
            })
            .await
            .map_err(|error| {
                self.fatal(FatalError::ClusterParams {
                    cluster: cluster_name.clone(),
                    error,
                })
            })?;

        let nbc = prepare_config(scenario, &params.base_config)?;
        match ConfigHash::of(&nbc) {
            Ok(hash) => info!(scenario = scenario.name, config_hash = %hash, "Node config prepared"),
            Err(e) => warn!(scenario = scenario.name, error = %e, "Could not fingerprint node config"),
        }

        let dir = ctx.logs.scenario_dir(scenario.name).await?;
        result.log_dir = Some(dir.clone());

        let keys = ctx.collaborators.keys.generate(&mut *rng)?;
        let payload = ctx.collaborators.generator.render(&nbc).await?;
        let name = ctx.names.allocate(rng)?;
        result.vmss_name = Some(name.to_string());

        let target = VmssRef::new(&ctx.config.subscription, &params.node_resource_group, name.clone());
        result.vmss_id = Some(target.id.clone());
        let spec = build_vmss_spec(&ctx.config, &ctx.run_id, scenario, name, &params, payload, &keys);
        debug!(scenario = scenario.name, vmss = %spec.name, sku = %spec.sku, image = %spec.image_id, "Scale set spec built");

        if ctx.halted() {
            return Err(ScenarioError::Halted);
        }

        let provisioner = Provisioner::new(Arc::clone(&ctx.collaborators.cloud));
        let provisioned = provisioner
            .scoped(spec, target.clone(), |outcome| {
                self.inspect(outcome, &target, &keys, &dir, &params, result)
            })
            .await;
        result.provision_states = provisioned.states;

        provisioned.value
    }

    /// Everything that happens while the scale set exists.
    async fn inspect(
        &self,
        outcome: ProvisioningOutcome,
        target: &VmssRef,
        keys: &KeyPair,
        dir: &Path,
        params: &ClusterParams,
        result: &mut ScenarioResult,
    ) -> Result<HealthCheckResult, ScenarioError> {
        if let Err(e) = logs::write_file(dir, VMSS_ID_FILE, target.id.as_bytes()).await {
            warn!(vmss = %target.name, error = %e, "Failed to write scale set ID");
        }

        match outcome {
            ProvisioningOutcome::Succeeded(_) => {
                self.extract_diagnostics(target, keys, dir, result).await;

                let kube = self.ctx.collaborators.kube.connect(params).await?;
                let validator = HealthValidator::new(kube, self.ctx.config.health.clone());
                Ok(validator.validate(target.name.as_str()).await?)
            }
            ProvisioningOutcome::ExpectedProvisioningError { instance, error } => {
                self.extract_diagnostics(&instance, keys, dir, result).await;
                Err(ScenarioError::ExtensionProvisioning(error))
            }
            // Halt before the guard's delete runs, not after.
            ProvisioningOutcome::FatalError(error) => Err(self.fatal(FatalError::Provisioning {
                vmss: target.name.to_string(),
                error,
            })),
        }
    }

    /// Raise a run-stopping error, halting the run immediately.
    fn fatal(&self, error: FatalError) -> ScenarioError {
        warn!(error = %error, "Halting run");
        self.ctx.halt();
        ScenarioError::Fatal(error)
    }

    /// Never fails the scenario; the error is only recorded.
    async fn extract_diagnostics(
        &self,
        target: &VmssRef,
        keys: &KeyPair,
        dir: &Path,
        result: &mut ScenarioResult,
    ) {
        let extractor = DiagnosticsExtractor::new(
            Arc::clone(&self.ctx.collaborators.diagnostics),
            self.ctx.config.diagnostics.clone(),
        );
        match extractor.extract(target, &keys.private_key, dir).await {
            Ok(report) => result.diagnostics_dir = Some(report.dir),
            Err(e) => {
                warn!(vmss = %target.name, error = %e, "Diagnostics extraction failed");
                result.diagnostics_error = Some(e.to_string());
            }
        }
    }
}
