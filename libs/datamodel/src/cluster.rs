//! Cluster properties as seen by scenario selectors and mutators.

use serde::{Deserialize, Serialize};

pub const NETWORK_PLUGIN_KUBENET: &str = "kubenet";
pub const NETWORK_PLUGIN_AZURE: &str = "azure";

pub const NETWORK_POLICY_NONE: &str = "";
pub const NETWORK_POLICY_CALICO: &str = "calico";

/// A managed cluster that scenarios can join nodes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
    pub name: String,
    pub location: String,
    /// Resource group holding the cluster's compute; scale sets go here.
    pub node_resource_group: String,
    pub kubernetes_version: String,
    pub network_plugin: String,
    #[serde(default)]
    pub network_policy: String,
}

impl ClusterModel {
    pub fn uses_network_plugin(&self, plugin: &str) -> bool {
        self.network_plugin.eq_ignore_ascii_case(plugin)
    }
}

/// Rendered node startup payload. Opaque to nodecheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBootstrapping {
    /// Base64 cloud-init custom data.
    pub custom_data: String,
    /// Command line of the custom script extension.
    pub cse: String,
}
