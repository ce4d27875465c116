//! `nodecheck run`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use nodecheck_orchestrator::simulated::Fault;
use nodecheck_orchestrator::{Orchestrator, ScenarioTable, Simulator, SuiteConfig};
use tracing::info;

use crate::error::CliError;
use crate::output::{print_report, OutputFormat};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Scenario to run; repeat for several. Defaults to NODECHECK_SCENARIOS,
    /// then to every scenario.
    #[arg(long = "scenario", value_name = "NAME")]
    pub scenarios: Vec<String>,

    /// Subscription holding the test clusters.
    #[arg(long)]
    pub subscription: Option<String>,

    /// Resource group holding the test clusters.
    #[arg(long)]
    pub resource_group: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    /// Root directory for per-scenario logs.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Scenarios running at once.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Seed for cluster choice and resource names.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Inject a failure into the simulated backend, e.g.
    /// `calico=extension-failure`.
    #[arg(long = "fault", value_name = "SCENARIO=FAULT", value_parser = parse_fault)]
    pub faults: Vec<(String, Fault)>,
}

impl RunCommand {
    pub async fn run(self, format: OutputFormat) -> Result<i32> {
        let config = self.config(SuiteConfig::from_env()?)?;
        let table = ScenarioTable::new(&config.scenarios_to_run)?;
        info!(
            scenarios = table.len(),
            resource_group = %config.resource_group,
            log_dir = %config.log_dir.display(),
            "Configuration loaded"
        );

        let simulator = Simulator::default();
        for (scenario, fault) in &self.faults {
            info!(scenario = %scenario, fault = ?fault, "Injecting fault");
            simulator.inject(scenario, *fault);
        }

        let orchestrator = Orchestrator::new(config, simulator.collaborators());
        let report = orchestrator.run(&table).await.context("run aborted")?;

        print_report(&report, format);
        Ok(report.exit_code())
    }

    /// Apply command line overrides on top of the environment.
    fn config(&self, mut config: SuiteConfig) -> Result<SuiteConfig> {
        if !self.scenarios.is_empty() {
            config.scenarios_to_run = self.scenarios.clone();
        }
        if let Some(subscription) = &self.subscription {
            config.subscription = subscription.clone();
        }
        if let Some(location) = &self.location {
            config.location = location.clone();
        }
        if let Some(resource_group) = &self.resource_group {
            config.resource_group = resource_group.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config.max_concurrency = max_concurrency;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_fault(s: &str) -> Result<(String, Fault), CliError> {
    let (scenario, kind) = s
        .split_once('=')
        .filter(|(scenario, kind)| !scenario.is_empty() && !kind.is_empty())
        .ok_or_else(|| CliError::InvalidFault(s.to_string()))?;

    let fault = match kind {
        "extension-failure" => Fault::ExtensionFailure,
        "authorization-failure" => Fault::AuthorizationFailure,
        "node-never-ready" => Fault::NodeNeverReady,
        "pod-never-ready" => Fault::ProbePodNeverReady,
        "pod-never-deleted" => Fault::ProbePodNeverDeleted,
        "diagnostics-unavailable" => Fault::DiagnosticsUnavailable,
        "delete-fails" => Fault::DeleteFails,
        other => return Err(CliError::UnknownFault(other.to_string())),
    };
    Ok((scenario.to_string(), fault))
}
