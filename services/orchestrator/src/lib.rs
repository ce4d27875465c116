//! nodecheck scenario orchestrator.
//!
//! Runs a table of node bootstrapping scenarios concurrently against a
//! shared pool of clusters. Each scenario gets a cluster, a private copy
//! of the node configuration and a transient scale set, which is always
//! deleted before the scenario returns.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator ── JoinSet, Semaphore(max_concurrency), watch(stop)
//!   └── ScenarioRunner (one per scenario)
//!         ├── ClusterSelector ── ClusterPool (per-cluster mutation lock)
//!         ├── ClusterCache     ── single-flight params per (cluster, generation)
//!         ├── Provisioner      ── ProvisioningOutcome + VmssGuard
//!         ├── DiagnosticsExtractor
//!         └── HealthValidator
//! ```
//!
//! ## Failure classes
//!
//! - Extension (bootstrap script) failures fail the scenario after
//!   diagnostics are pulled.
//! - Any other provisioning failure, or failing to read cluster
//!   parameters, is fatal: no new scenario starts, running ones finish and
//!   clean up.
//! - Everything else fails only its own scenario.

pub mod clients;
pub mod cluster;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod logs;
pub mod orchestrator;
pub mod provision;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod simulated;

pub use clients::Collaborators;
pub use config::SuiteConfig;
pub use error::{FatalError, ScenarioError};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use report::{RunReport, ScenarioResult, ScenarioStatus};
pub use scenario::{Scenario, ScenarioTable};
pub use simulated::Simulator;
