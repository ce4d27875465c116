//! End-to-end scenario runs against the simulated backend.
//!
//! Each test drives the full orchestrator: cluster selection, the
//! parameter cache, provisioning, diagnostics, health validation and
//! cleanup, then checks the report and the simulator's call counters.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p nodecheck-e2e --test scenarios
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodecheck_datamodel::{distro, NETWORK_PLUGIN_AZURE, NETWORK_PLUGIN_KUBENET, NETWORK_POLICY_CALICO};
use nodecheck_orchestrator::cluster::ClusterParams;
use nodecheck_orchestrator::clients::{ClusterMetadataClient, KubeConnector, MembershipClient};
use nodecheck_orchestrator::config::{DiagnosticsConfig, HealthConfig};
use nodecheck_orchestrator::error::KubeError;
use nodecheck_orchestrator::logs::VMSS_ID_FILE;
use nodecheck_orchestrator::provision::ProvisionState;
use nodecheck_orchestrator::runner::prepare_config;
use nodecheck_orchestrator::scenario::catalog;
use nodecheck_orchestrator::simulated::{
    default_clusters, simulated_cluster, Fault, SIMULATED_SUBSCRIPTION,
};
use nodecheck_orchestrator::{
    Collaborators, Orchestrator, RunReport, Scenario, ScenarioResult, ScenarioStatus,
    ScenarioTable, Simulator, SuiteConfig,
};
use nodecheck_poll::PollConfig;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Short waits so timeouts resolve quickly.
fn fast_config(log_dir: &Path) -> SuiteConfig {
    let poll = PollConfig::new(Duration::from_millis(300), Duration::from_millis(10));
    SuiteConfig {
        subscription: SIMULATED_SUBSCRIPTION.to_string(),
        resource_group: "nodecheck-e2e-eastus".to_string(),
        log_dir: log_dir.to_path_buf(),
        max_concurrency: 4,
        seed: Some(7),
        health: HealthConfig {
            node_ready: poll,
            pod_ready: poll,
            pod_deleted: poll,
            ..HealthConfig::default()
        },
        diagnostics: DiagnosticsConfig { fetch: poll },
        ..SuiteConfig::default()
    }
}

fn scenario(name: &str) -> Scenario {
    catalog().into_iter().find(|s| s.name == name).unwrap()
}

fn table(names: &[&str]) -> ScenarioTable {
    let names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    ScenarioTable::new(&names).unwrap()
}

/// Copies of `base` under distinct names.
fn copies(base: &str, names: &[&'static str]) -> ScenarioTable {
    let base = scenario(base);
    let scenarios = names
        .iter()
        .map(|&name| Scenario {
            name,
            ..base.clone()
        })
        .collect();
    ScenarioTable::from_catalog(scenarios, &[]).unwrap()
}

async fn run(sim: &Simulator, config: SuiteConfig, table: &ScenarioTable) -> RunReport {
    run_with(sim.collaborators(), config, table).await
}

async fn run_with(
    collaborators: Collaborators,
    config: SuiteConfig,
    table: &ScenarioTable,
) -> RunReport {
    init_tracing();
    Orchestrator::new(config, collaborators)
        .run(table)
        .await
        .unwrap()
}

fn result<'a>(report: &'a RunReport, scenario: &str) -> &'a ScenarioResult {
    report
        .results
        .iter()
        .find(|r| r.scenario == scenario)
        .unwrap()
}

#[tokio::test]
async fn test_all_scenarios_pass() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();

    let report = run(&sim, fast_config(logs.path()), &table(&[])).await;

    assert_eq!(report.results.len(), catalog().len());
    assert_eq!(report.exit_code(), 0, "{report:#?}");
    assert!(report.fatal.is_none());

    for r in &report.results {
        assert_eq!(r.status, ScenarioStatus::Passed, "{r:#?}");
        let health = r.health.as_ref().unwrap();
        assert!(health.node_name.starts_with(r.vmss_name.as_deref().unwrap()));
        assert!(health.pod_ready && health.pod_deleted);

        let dir = r.log_dir.as_ref().unwrap();
        let id = std::fs::read_to_string(dir.join(VMSS_ID_FILE)).unwrap();
        assert_eq!(Some(id), r.vmss_id);
        assert!(r.diagnostics_dir.as_ref().unwrap().join("cluster-provision.log").exists());

        assert_eq!(sim.deletes_for_scenario(&r.scenario), 1);
        assert_eq!(*r.provision_states.last().unwrap(), ProvisionState::Cleaned);
    }

    assert!(sim.live_vmss().is_empty());
    let names: HashSet<_> = report.results.iter().map(|r| r.vmss_name.clone()).collect();
    assert_eq!(names.len(), report.results.len());
}

#[tokio::test]
async fn test_calico_config_reaches_the_node() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();

    let report = run(&sim, fast_config(logs.path()), &table(&["calico"])).await;
    assert_eq!(result(&report, "calico").status, ScenarioStatus::Passed);
    assert_eq!(result(&report, "calico").cluster.as_deref(), Some("nodecheck-kubenet"));

    let mut rendered = sim.rendered_config("calico").unwrap();
    assert_eq!(rendered.network_policy(), Some(NETWORK_POLICY_CALICO));
    assert_eq!(rendered.distro(), Some(distro::UBUNTU_CONTAINERD_2204_GEN2));
    assert_eq!(
        rendered.pool_kubernetes_config_mut().unwrap().network_policy,
        NETWORK_POLICY_CALICO
    );
}

#[tokio::test]
async fn test_extension_failure_extracts_diagnostics_and_skips_health() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("calico", Fault::ExtensionFailure);

    let report = run(&sim, fast_config(logs.path()), &table(&["calico"])).await;
    let calico = result(&report, "calico");

    assert_eq!(calico.status, ScenarioStatus::Failed);
    assert_eq!(calico.reason_code.as_deref(), Some("extension_provisioning_error"));
    assert!(calico.health.is_none());
    assert!(report.fatal.is_none());
    assert_eq!(report.exit_code(), 1);

    let diagnostics = calico.diagnostics_dir.as_ref().unwrap();
    let log = std::fs::read_to_string(diagnostics.join("cluster-provision.log")).unwrap();
    assert!(log.contains("exit status=50"));
    assert!(calico.log_dir.as_ref().unwrap().join(VMSS_ID_FILE).exists());

    let stats = sim.stats();
    assert_eq!(stats.diagnostics_fetches, 1);
    assert_eq!(stats.node_lists, 0);
    assert_eq!(stats.pod_creates, 0);
    assert_eq!(sim.deletes_for_scenario("calico"), 1);
}

#[tokio::test]
async fn test_extension_failure_does_not_stop_other_scenarios() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("calico", Fault::ExtensionFailure);

    let report = run(&sim, fast_config(logs.path()), &table(&[])).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.passed(), catalog().len() - 1);
    assert_eq!(report.skipped(), 0);
}

#[tokio::test]
async fn test_authorization_failure_halts_the_run() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("ubuntu2204", Fault::AuthorizationFailure);
    let config = SuiteConfig {
        max_concurrency: 1,
        ..fast_config(logs.path())
    };

    let report = run(&sim, config, &table(&["ubuntu2204", "calico", "marinerv2"])).await;

    let ubuntu = result(&report, "ubuntu2204");
    assert_eq!(ubuntu.status, ScenarioStatus::Failed);
    assert_eq!(ubuntu.reason_code.as_deref(), Some("fatal_provisioning_error"));
    assert!(ubuntu.diagnostics_dir.is_none());
    assert!(report.fatal.is_some());
    assert_eq!(report.exit_code(), 2);

    assert_eq!(result(&report, "calico").status, ScenarioStatus::Skipped);
    assert_eq!(result(&report, "marinerv2").status, ScenarioStatus::Skipped);

    let stats = sim.stats();
    assert_eq!(stats.creates, 1);
    assert_eq!(stats.diagnostics_fetches, 0);
    assert_eq!(sim.deletes_for_scenario("ubuntu2204"), 1);
}

#[tokio::test]
async fn test_cluster_params_failure_is_fatal() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.fail_cluster_params(true);
    let config = SuiteConfig {
        max_concurrency: 1,
        ..fast_config(logs.path())
    };

    let report = run(&sim, config, &table(&["ubuntu2204", "marinerv2"])).await;

    assert_eq!(
        result(&report, "ubuntu2204").reason_code.as_deref(),
        Some("fatal_cluster_params_error")
    );
    assert_eq!(result(&report, "marinerv2").status, ScenarioStatus::Skipped);
    assert_eq!(sim.stats().creates, 0);
    assert_eq!(sim.stats().total_deletes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_cluster_is_mutated_once() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::with_timing(
        vec![
            simulated_cluster("azure-1", NETWORK_PLUGIN_AZURE),
            simulated_cluster("azure-2", NETWORK_PLUGIN_AZURE),
        ],
        Duration::from_millis(2),
        1,
    );
    let config = SuiteConfig {
        max_concurrency: 8,
        ..fast_config(logs.path())
    };
    let table = copies("calico", &["calico-1", "calico-2", "calico-3", "calico-4", "calico-5", "calico-6"]);

    let report = run(&sim, config, &table).await;

    assert_eq!(report.passed(), 6, "{report:#?}");
    assert_eq!(sim.stats().cluster_updates, 1);
    for r in &report.results {
        assert_eq!(r.cluster.as_deref(), Some("azure-1"));
    }
    let clusters = sim.clusters();
    assert_eq!(clusters[0].network_plugin, NETWORK_PLUGIN_KUBENET);
    assert_eq!(clusters[1].network_plugin, NETWORK_PLUGIN_AZURE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_params_are_fetched_once() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::with_timing(
        vec![simulated_cluster("only", NETWORK_PLUGIN_KUBENET)],
        Duration::from_millis(5),
        1,
    );
    let config = SuiteConfig {
        max_concurrency: 8,
        ..fast_config(logs.path())
    };
    let table = copies(
        "ubuntu2204",
        &["u-1", "u-2", "u-3", "u-4", "u-5", "u-6", "u-7", "u-8"],
    );

    let report = run(&sim, config, &table).await;

    assert_eq!(report.passed(), 8, "{report:#?}");
    assert_eq!(sim.stats().param_fetches, 1);
}

#[tokio::test]
async fn test_scenarios_sharing_a_cluster_do_not_share_config() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::new(vec![simulated_cluster("only", NETWORK_PLUGIN_KUBENET)]);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204", "calico", "marinerv2"])).await;
    assert_eq!(report.passed(), 3);

    let calico = sim.rendered_config("calico").unwrap();
    let ubuntu = sim.rendered_config("ubuntu2204").unwrap();
    let mariner = sim.rendered_config("marinerv2").unwrap();
    assert_eq!(calico.network_policy(), Some(NETWORK_POLICY_CALICO));
    assert_eq!(ubuntu.network_policy(), Some(""));
    assert_eq!(mariner.network_policy(), Some(""));
    assert_eq!(mariner.distro(), Some(distro::MARINER_V2_GEN2));
}

#[tokio::test]
async fn test_prepare_config_leaves_base_untouched() {
    let sim = Simulator::default();
    let cluster = sim.clusters().remove(0);
    let params = sim.get_cluster_params(&cluster).await.unwrap();
    let before = params.base_config.clone();

    let mutated = prepare_config(&scenario("calico"), &params.base_config).unwrap();

    assert_eq!(params.base_config, before);
    assert_ne!(mutated, before);
    assert_eq!(mutated.network_policy(), Some(NETWORK_POLICY_CALICO));
}

#[tokio::test]
async fn test_node_never_ready_fails_only_that_scenario() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("marinerv2", Fault::NodeNeverReady);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204", "marinerv2"])).await;

    let mariner = result(&report, "marinerv2");
    assert_eq!(mariner.status, ScenarioStatus::Failed);
    assert_eq!(mariner.reason_code.as_deref(), Some("node_not_ready"));
    assert!(mariner.diagnostics_dir.is_some());
    assert_eq!(result(&report, "ubuntu2204").status, ScenarioStatus::Passed);
    assert!(report.fatal.is_none());
    assert_eq!(sim.deletes_for_scenario("marinerv2"), 1);
}

#[tokio::test]
async fn test_stuck_probe_pod_fails_the_scenario() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("ubuntu2204", Fault::ProbePodNeverDeleted);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204"])).await;

    let ubuntu = result(&report, "ubuntu2204");
    assert_eq!(ubuntu.reason_code.as_deref(), Some("probe_pod_not_deleted"));
    assert_eq!(sim.deletes_for_scenario("ubuntu2204"), 1);
}

#[tokio::test]
async fn test_missing_diagnostics_do_not_fail_the_scenario() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("ubuntu2204", Fault::DiagnosticsUnavailable);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204"])).await;

    let ubuntu = result(&report, "ubuntu2204");
    assert_eq!(ubuntu.status, ScenarioStatus::Passed);
    assert!(ubuntu.diagnostics_dir.is_none());
    assert!(ubuntu.diagnostics_error.is_some());
}

#[tokio::test]
async fn test_failed_delete_is_not_a_scenario_failure() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("ubuntu2204", Fault::DeleteFails);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204"])).await;

    assert_eq!(result(&report, "ubuntu2204").status, ScenarioStatus::Passed);
    assert_eq!(sim.deletes_for_scenario("ubuntu2204"), 1);
    assert_eq!(sim.live_vmss().len(), 1);
}

struct PanickingConnector;

#[async_trait]
impl KubeConnector for PanickingConnector {
    async fn connect(&self, _params: &ClusterParams) -> Result<Arc<dyn MembershipClient>, KubeError> {
        panic!("membership client exploded");
    }
}

#[tokio::test]
async fn test_panic_during_health_still_deletes_once() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    let collaborators = Collaborators {
        kube: Arc::new(PanickingConnector),
        ..sim.collaborators()
    };

    let report = run_with(collaborators, fast_config(logs.path()), &table(&["ubuntu2204", "marinerv2"])).await;

    for r in &report.results {
        assert_eq!(r.status, ScenarioStatus::Failed);
        assert_eq!(r.reason_code.as_deref(), Some("panicked"));
        assert_eq!(sim.deletes_for_scenario(&r.scenario), 1);
    }
    assert!(report.fatal.is_none());
    assert!(sim.live_vmss().is_empty());
}

#[tokio::test]
async fn test_unknown_scenario_is_rejected_before_any_call() {
    let sim = Simulator::default();
    let err = ScenarioTable::new(&["nope".to_string()]).unwrap_err();
    assert!(err.to_string().contains("nope"));
    assert_eq!(sim.stats(), Default::default());
}

#[tokio::test]
async fn test_default_pool_has_both_network_plugins() {
    let plugins: HashSet<String> = default_clusters().into_iter().map(|c| c.network_plugin).collect();
    assert!(plugins.contains(NETWORK_PLUGIN_KUBENET));
    assert!(plugins.contains(NETWORK_PLUGIN_AZURE));
}

#[tokio::test]
async fn test_report_serializes_for_machines() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("calico", Fault::ExtensionFailure);

    let report = run(&sim, fast_config(logs.path()), &table(&["ubuntu2204", "calico"])).await;
    let json = serde_json::to_value(&report).unwrap();

    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["scenario"], "ubuntu2204");
    assert_eq!(results[0]["status"], "passed");
    assert!(results[0].get("reason_code").is_none());
    assert_eq!(results[1]["status"], "failed");
    assert_eq!(results[1]["reason_code"], "extension_provisioning_error");
    assert!(json["fatal"].is_null());
}

#[tokio::test]
async fn test_fatal_error_halts_before_cleanup_finishes() {
    let logs = TempDir::new().unwrap();
    let sim = Simulator::default();
    sim.inject("first", Fault::AuthorizationFailure);
    sim.delay_deletes("first", Duration::from_millis(1500));
    sim.inject("second", Fault::NodeNeverReady);
    let config = SuiteConfig {
        max_concurrency: 2,
        ..fast_config(logs.path())
    };
    let table = copies("ubuntu2204", &["first", "second", "third"]);

    let report = run(&sim, config, &table).await;

    let first = result(&report, "first");
    assert_eq!(first.reason_code.as_deref(), Some("fatal_provisioning_error"));
    assert_eq!(sim.deletes_for_scenario("first"), 1);
    assert_eq!(report.exit_code(), 2);

    // "second" may or may not have been past its last check when the run
    // halted; "third" could only start after the halt.
    let second = result(&report, "second");
    assert!(
        second.status == ScenarioStatus::Skipped
            || second.reason_code.as_deref() == Some("node_not_ready"),
        "{second:#?}"
    );
    assert_eq!(result(&report, "third").status, ScenarioStatus::Skipped);
    assert!(sim.vmss_for_scenario("third").is_empty());
    assert_eq!(sim.stats().creates as usize, report.results.len() - report.skipped());
}
