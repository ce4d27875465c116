//! Collaborator interfaces.
//!
//! The orchestrator never talks to a cloud or cluster directly; it goes
//! through these traits. [`crate::simulated`] provides in-process
//! implementations for development and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use nodecheck_datamodel::{ClusterModel, NodeBootstrapping, NodeBootstrappingConfiguration};
use nodecheck_id::VmssName;
use rand::RngCore;
use serde::Serialize;

use crate::cluster::ClusterParams;
use crate::error::{
    CloudError, GeneratorError, KeyError, KubeError, MetadataError, TransportError,
};

/// Request to create a scale set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmssSpec {
    pub name: VmssName,
    pub resource_group: String,
    pub location: String,
    pub sku: String,
    pub capacity: u32,
    pub image_id: String,
    pub subnet_id: String,
    pub admin_username: String,
    pub ssh_public_key: String,
    pub custom_data: String,
    pub cse: String,
    pub tags: BTreeMap<String, String>,
}

/// Address of a provisioned scale set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VmssRef {
    pub name: VmssName,
    pub resource_group: String,
    /// Full resource ID.
    pub id: String,
}

impl VmssRef {
    pub fn new(subscription: &str, resource_group: &str, name: VmssName) -> Self {
        let id = format!(
            "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Compute/virtualMachineScaleSets/{name}"
        );
        Self {
            name,
            resource_group: resource_group.to_string(),
            id,
        }
    }
}

/// Completed create operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmssModel {
    pub id: String,
    pub name: VmssName,
    pub provisioning_state: String,
}

/// Handle to a long-running cloud operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: String,
    pub target: VmssRef,
}

/// Cloud resource client.
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn ensure_resource_group(&self, name: &str, location: &str) -> Result<(), CloudError>;

    /// Submit a create; the returned operation must be polled.
    async fn create_vmss(&self, spec: &VmssSpec) -> Result<Operation, CloudError>;

    /// Wait for a create to finish. Bounded by the client's own polling.
    async fn poll_until_done(&self, operation: &Operation) -> Result<VmssModel, CloudError>;

    async fn delete_vmss(&self, vmss: &VmssRef) -> Result<Operation, CloudError>;

    async fn poll_delete(&self, operation: &Operation) -> Result<(), CloudError>;
}

/// Cluster metadata client.
#[async_trait]
pub trait ClusterMetadataClient: Send + Sync {
    async fn list_clusters(&self, resource_group: &str) -> Result<Vec<ClusterModel>, MetadataError>;

    /// Credentials, subnet and base node configuration of a cluster.
    async fn get_cluster_params(&self, cluster: &ClusterModel) -> Result<ClusterParams, MetadataError>;

    /// Apply a changed cluster model and return the cluster as it now is.
    async fn update_cluster(&self, cluster: &ClusterModel) -> Result<ClusterModel, MetadataError>;
}

/// Node as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodStatus {
    pub phase: PodPhase,
    pub ready: bool,
}

/// Kubernetes-like membership client for one cluster.
#[async_trait]
pub trait MembershipClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, KubeError>;

    async fn create_pod(&self, pod: &PodSpec) -> Result<(), KubeError>;

    /// `None` once the pod no longer exists.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodStatus>, KubeError>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), KubeError>;
}

/// Builds membership clients from cached cluster credentials.
#[async_trait]
pub trait KubeConnector: Send + Sync {
    async fn connect(&self, params: &ClusterParams) -> Result<Arc<dyn MembershipClient>, KubeError>;
}

/// Renders the node startup payload.
#[async_trait]
pub trait BootstrapGenerator: Send + Sync {
    async fn render(
        &self,
        config: &NodeBootstrappingConfiguration,
    ) -> Result<NodeBootstrapping, GeneratorError>;
}

/// SSH key material for one provisioned resource.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: Vec<u8>,
    /// OpenSSH formatted public key.
    pub public_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

pub trait KeyPairGenerator: Send + Sync {
    fn generate(&self, rng: &mut dyn RngCore) -> Result<KeyPair, KeyError>;
}

/// One retrieved log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogArtifact {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Pulls boot and extension logs off a provisioned resource.
#[async_trait]
pub trait DiagnosticsTransport: Send + Sync {
    async fn fetch_logs(
        &self,
        vmss: &VmssRef,
        private_key: &[u8],
    ) -> Result<Vec<LogArtifact>, TransportError>;
}

/// Every external collaborator a run needs.
#[derive(Clone)]
pub struct Collaborators {
    pub cloud: Arc<dyn CloudClient>,
    pub clusters: Arc<dyn ClusterMetadataClient>,
    pub kube: Arc<dyn KubeConnector>,
    pub generator: Arc<dyn BootstrapGenerator>,
    pub keys: Arc<dyn KeyPairGenerator>,
    pub diagnostics: Arc<dyn DiagnosticsTransport>,
}
