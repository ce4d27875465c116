//! Error types for scenario execution.
//!
//! Only [`FatalError`] is allowed to stop a run. Everything else ends up as
//! a failed [`crate::report::ScenarioResult`].

use nodecheck_datamodel::MutationError;
use nodecheck_id::IdError;
use thiserror::Error;

use crate::cluster::SelectError;
use crate::health::HealthError;

/// Error code the cloud reports when a guest extension (the bootstrap
/// script) exits non-zero after the instance itself was created.
pub const EXTENSION_PROVISIONING_ERROR_CODE: &str = "VMExtensionProvisioningError";

/// Where a cloud error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudErrorKind {
    /// The API answered with an error.
    Api { status: u16 },

    /// The API could not be reached or the response was unreadable.
    Transport,
}

impl std::fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudErrorKind::Api { status } => write!(f, "api status {status}"),
            CloudErrorKind::Transport => f.write_str("transport"),
        }
    }
}

/// Structured error from the cloud resource client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {code}: {message}")]
pub struct CloudError {
    pub kind: CloudErrorKind,
    pub code: String,
    pub message: String,
}

impl CloudError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: CloudErrorKind::Api { status },
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: CloudErrorKind::Transport,
            code: String::new(),
            message: message.into(),
        }
    }

    /// Guest extension failed after the instance was created.
    pub fn is_extension_provisioning_error(&self) -> bool {
        matches!(self.kind, CloudErrorKind::Api { .. })
            && self.code == EXTENSION_PROVISIONING_ERROR_CODE
    }
}

/// Cluster metadata client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("cluster not found: {0}")]
    NotFound(String),

    #[error("metadata api error: {0}")]
    Api(String),
}

/// Cluster membership (Kubernetes) client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KubeError {
    #[error("kube api error: {0}")]
    Api(String),

    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected state: {0}")]
    UnexpectedState(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("bootstrap rendering failed: {0}")]
pub struct GeneratorError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("key generation failed: {0}")]
pub struct KeyError(pub String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("instance not reachable: {0}")]
    Unreachable(String),

    #[error("log retrieval rejected: {0}")]
    Rejected(String),
}

/// Infrastructure-level failure. Stops the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error("provisioning {vmss} failed: {error}")]
    Provisioning { vmss: String, error: CloudError },

    #[error("fetching parameters of cluster {cluster} failed: {error}")]
    ClusterParams { cluster: String, error: MetadataError },
}

impl FatalError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            FatalError::Provisioning { .. } => "fatal_provisioning_error",
            FatalError::ClusterParams { .. } => "fatal_cluster_params_error",
        }
    }
}

/// Everything that can end a scenario early.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("run halted before this scenario started")]
    Halted,

    #[error("cluster selection failed: {0}")]
    Selection(#[from] SelectError),

    #[error("config mutation failed: {0}")]
    ConfigMutation(#[from] MutationError),

    #[error(transparent)]
    Render(#[from] GeneratorError),

    #[error(transparent)]
    KeyGeneration(#[from] KeyError),

    #[error("name allocation failed: {0}")]
    Name(#[from] IdError),

    #[error("log directory: {0}")]
    Logs(#[from] std::io::Error),

    #[error("connecting to cluster: {0}")]
    Kube(#[from] KubeError),

    #[error("bootstrap extension failed: {0}")]
    ExtensionProvisioning(CloudError),

    #[error("health validation failed: {0}")]
    Health(#[from] HealthError),

    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

impl ScenarioError {
    /// Returns true if the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScenarioError::Fatal(_))
    }

    /// Short machine-readable reason for summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ScenarioError::Halted => "halted",
            ScenarioError::Selection(e) => e.reason_code(),
            ScenarioError::ConfigMutation(_) => "config_mutation_failed",
            ScenarioError::Render(_) => "render_failed",
            ScenarioError::KeyGeneration(_) => "key_generation_failed",
            ScenarioError::Name(_) => "name_allocation_failed",
            ScenarioError::Logs(_) => "log_dir_failed",
            ScenarioError::Kube(_) => "cluster_unreachable",
            ScenarioError::ExtensionProvisioning(_) => "extension_provisioning_error",
            ScenarioError::Health(e) => e.reason_code(),
            ScenarioError::Fatal(e) => e.reason_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_error_matches_exact_code_only() {
        let cse = CloudError::api(200, EXTENSION_PROVISIONING_ERROR_CODE, "exit 50");
        assert!(cse.is_extension_provisioning_error());

        let lower = CloudError::api(200, "vmextensionprovisioningerror", "exit 50");
        assert!(!lower.is_extension_provisioning_error());

        let auth = CloudError::api(403, "AuthorizationFailed", "denied");
        assert!(!auth.is_extension_provisioning_error());

        let mut transport = CloudError::transport("reset");
        transport.code = EXTENSION_PROVISIONING_ERROR_CODE.to_string();
        assert!(!transport.is_extension_provisioning_error());
    }

    #[test]
    fn test_only_fatal_is_fatal() {
        let fatal = ScenarioError::from(FatalError::Provisioning {
            vmss: "abtestaaaa".to_string(),
            error: CloudError::api(401, "AuthorizationFailed", "denied"),
        });
        assert!(fatal.is_fatal());
        assert_eq!(fatal.reason_code(), "fatal_provisioning_error");

        let cse = ScenarioError::ExtensionProvisioning(CloudError::api(
            200,
            EXTENSION_PROVISIONING_ERROR_CODE,
            "exit 50",
        ));
        assert!(!cse.is_fatal());
        assert_eq!(cse.reason_code(), "extension_provisioning_error");
    }

    #[test]
    fn test_selection_failures_keep_their_cause() {
        let cases = [
            (
                SelectError::NoCompatibleCluster { scenario: "s".to_string() },
                "no_compatible_cluster",
            ),
            (
                SelectError::NoMutableCluster { scenario: "s".to_string() },
                "no_mutable_cluster",
            ),
            (
                SelectError::MutationDidNotMatch {
                    scenario: "s".to_string(),
                    cluster: "c".to_string(),
                },
                "cluster_mutation_mismatch",
            ),
            (
                SelectError::Update {
                    cluster: "c".to_string(),
                    error: MetadataError::Api("500".to_string()),
                },
                "cluster_update_failed",
            ),
        ];
        for (error, code) in cases {
            assert_eq!(ScenarioError::from(error).reason_code(), code);
        }
    }

    #[test]
    fn test_fatal_reason_codes() {
        let params = FatalError::ClusterParams {
            cluster: "c".to_string(),
            error: MetadataError::NotFound("c".to_string()),
        };
        assert_eq!(params.reason_code(), "fatal_cluster_params_error");
        assert_eq!(ScenarioError::from(params).reason_code(), "fatal_cluster_params_error");
    }
}
