//! Per-scenario results and the run summary.

use std::path::PathBuf;

use nodecheck_id::RunId;
use serde::Serialize;

use crate::error::FatalError;
use crate::health::HealthCheckResult;
use crate::provision::ProvisionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Never started because the run was halted.
    Skipped,
}

impl std::fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "failed",
            ScenarioStatus::Skipped => "skipped",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: String,
    pub status: ScenarioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmss_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmss_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_dir: Option<PathBuf>,
    /// Why diagnostics could not be extracted. Does not affect status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_error: Option<String>,
    pub provision_states: Vec<ProvisionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthCheckResult>,
    pub elapsed_ms: u64,
}

impl ScenarioResult {
    /// Empty result for `scenario` with the given status.
    pub fn new(scenario: impl Into<String>, status: ScenarioStatus) -> Self {
        Self {
            scenario: scenario.into(),
            status,
            reason_code: None,
            reason: None,
            cluster: None,
            vmss_name: None,
            vmss_id: None,
            log_dir: None,
            diagnostics_dir: None,
            diagnostics_error: None,
            provision_states: Vec::new(),
            health: None,
            elapsed_ms: 0,
        }
    }

    pub fn skipped(scenario: impl Into<String>) -> Self {
        let mut result = Self::new(scenario, ScenarioStatus::Skipped);
        result.reason_code = Some("halted".to_string());
        result.reason = Some("run halted by a fatal error".to_string());
        result
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub results: Vec<ScenarioResult>,
    #[serde(serialize_with = "serialize_fatal")]
    pub fatal: Option<FatalError>,
}

fn serialize_fatal<S: serde::Serializer>(
    fatal: &Option<FatalError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match fatal {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.count(ScenarioStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(ScenarioStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(ScenarioStatus::Skipped)
    }

    /// 0 only if no fatal error occurred and no scenario failed.
    pub fn exit_code(&self) -> i32 {
        if self.fatal.is_some() {
            2
        } else if self.failed() > 0 {
            1
        } else {
            0
        }
    }

    fn count(&self, status: ScenarioStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
