//! Node bootstrapping configuration.
//!
//! Field names follow the camelCase JSON shape consumed by the bootstrap
//! payload generator. Optional sub-trees are `Option`s so that mutators can
//! report a missing dependency instead of panicking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::MutationError;

/// Well-known node image distros.
pub mod distro {
    pub const UBUNTU_CONTAINERD_2204_GEN2: &str = "aks-ubuntu-containerd-22.04-gen2";
    pub const UBUNTU_CONTAINERD_2204: &str = "aks-ubuntu-containerd-22.04";
    pub const MARINER_V2_GEN2: &str = "aks-cblmariner-v2-gen2";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeBootstrappingConfiguration {
    #[serde(default)]
    pub container_service: Option<ContainerService>,
    #[serde(default)]
    pub agent_pool_profile: Option<AgentPoolProfile>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub user_assigned_identity_client_id: String,
    /// Kubelet command line flags, e.g. `--max-pods`.
    #[serde(default)]
    pub kubelet_config: BTreeMap<String, String>,
    #[serde(default)]
    pub enable_nvidia: bool,
    #[serde(default)]
    pub fips_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerService {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    #[serde(default)]
    pub orchestrator_profile: Option<OrchestratorProfile>,
    #[serde(default)]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    #[serde(default)]
    pub linux_profile: Option<LinuxProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProfile {
    pub orchestrator_type: String,
    pub orchestrator_version: String,
    #[serde(default)]
    pub kubernetes_config: Option<KubernetesConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    #[serde(default)]
    pub network_plugin: String,
    #[serde(default)]
    pub network_policy: String,
    #[serde(default)]
    pub container_runtime: String,
    #[serde(default)]
    pub dns_service_ip: String,
    #[serde(default)]
    pub service_cidr: String,
    #[serde(default)]
    pub cluster_subnet: String,
    #[serde(default)]
    pub load_balancer_sku: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    pub name: String,
    pub vm_size: String,
    #[serde(default)]
    pub os_type: String,
    #[serde(default)]
    pub distro: String,
    #[serde(default)]
    pub kubernetes_config: Option<KubernetesConfig>,
    #[serde(default)]
    pub custom_node_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxProfile {
    pub admin_username: String,
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,
}

impl NodeBootstrappingConfiguration {
    fn properties_mut(&mut self) -> Result<&mut Properties, MutationError> {
        self.container_service
            .as_mut()
            .ok_or(MutationError::MissingField("containerService"))?
            .properties
            .as_mut()
            .ok_or(MutationError::MissingField("containerService.properties"))
    }

    /// `containerService.properties.orchestratorProfile.kubernetesConfig`
    pub fn cluster_kubernetes_config_mut(&mut self) -> Result<&mut KubernetesConfig, MutationError> {
        self.properties_mut()?
            .orchestrator_profile
            .as_mut()
            .ok_or(MutationError::MissingField(
                "containerService.properties.orchestratorProfile",
            ))?
            .kubernetes_config
            .as_mut()
            .ok_or(MutationError::MissingField(
                "containerService.properties.orchestratorProfile.kubernetesConfig",
            ))
    }

    /// `containerService.properties.agentPoolProfiles[0]`
    pub fn first_pool_profile_mut(&mut self) -> Result<&mut AgentPoolProfile, MutationError> {
        self.properties_mut()?
            .agent_pool_profiles
            .first_mut()
            .ok_or(MutationError::MissingField(
                "containerService.properties.agentPoolProfiles[0]",
            ))
    }

    /// The top-level `agentPoolProfile` the node joins as.
    pub fn agent_pool_profile_mut(&mut self) -> Result<&mut AgentPoolProfile, MutationError> {
        self.agent_pool_profile
            .as_mut()
            .ok_or(MutationError::MissingField("agentPoolProfile"))
    }

    /// `agentPoolProfile.kubernetesConfig`
    pub fn pool_kubernetes_config_mut(&mut self) -> Result<&mut KubernetesConfig, MutationError> {
        self.agent_pool_profile_mut()?
            .kubernetes_config
            .as_mut()
            .ok_or(MutationError::MissingField("agentPoolProfile.kubernetesConfig"))
    }

    /// Set the distro on both the cluster's first pool and the joining pool.
    pub fn set_distro(&mut self, distro: &str) -> Result<(), MutationError> {
        self.first_pool_profile_mut()?.distro = distro.to_string();
        self.agent_pool_profile_mut()?.distro = distro.to_string();
        Ok(())
    }

    /// Set the network policy on both the cluster and the joining pool.
    pub fn set_network_policy(&mut self, policy: &str) -> Result<(), MutationError> {
        self.cluster_kubernetes_config_mut()?.network_policy = policy.to_string();
        self.pool_kubernetes_config_mut()?.network_policy = policy.to_string();
        Ok(())
    }

    /// Distro of the joining pool, if any.
    pub fn distro(&self) -> Option<&str> {
        self.agent_pool_profile.as_ref().map(|p| p.distro.as_str())
    }

    /// Network policy of the cluster, if the subtree is present.
    pub fn network_policy(&self) -> Option<&str> {
        self.container_service
            .as_ref()?
            .properties
            .as_ref()?
            .orchestrator_profile
            .as_ref()?
            .kubernetes_config
            .as_ref()
            .map(|k| k.network_policy.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeBootstrappingConfiguration {
        let k8s = KubernetesConfig {
            network_plugin: "kubenet".to_string(),
            ..Default::default()
        };
        let pool = AgentPoolProfile {
            name: "nodepool2".to_string(),
            vm_size: "Standard_DS2_v2".to_string(),
            os_type: "Linux".to_string(),
            distro: distro::UBUNTU_CONTAINERD_2204.to_string(),
            kubernetes_config: Some(k8s.clone()),
            custom_node_labels: BTreeMap::new(),
        };
        NodeBootstrappingConfiguration {
            container_service: Some(ContainerService {
                id: "cs".to_string(),
                name: "c1".to_string(),
                location: "eastus".to_string(),
                properties: Some(Properties {
                    orchestrator_profile: Some(OrchestratorProfile {
                        orchestrator_type: "Kubernetes".to_string(),
                        orchestrator_version: "1.29.2".to_string(),
                        kubernetes_config: Some(k8s),
                    }),
                    agent_pool_profiles: vec![pool.clone()],
                    linux_profile: None,
                }),
            }),
            agent_pool_profile: Some(pool),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_network_policy_touches_both_trees() {
        let mut nbc = sample();
        nbc.set_network_policy("calico").unwrap();
        assert_eq!(nbc.network_policy(), Some("calico"));
        assert_eq!(
            nbc.agent_pool_profile
                .as_ref()
                .and_then(|p| p.kubernetes_config.as_ref())
                .map(|k| k.network_policy.as_str()),
            Some("calico")
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let base = sample();
        let mut copy = base.clone();
        copy.set_distro(distro::MARINER_V2_GEN2).unwrap();
        copy.kubelet_config
            .insert("--max-pods".to_string(), "30".to_string());

        assert_eq!(base.distro(), Some(distro::UBUNTU_CONTAINERD_2204));
        assert!(base.kubelet_config.is_empty());
        assert_eq!(copy.distro(), Some(distro::MARINER_V2_GEN2));
    }

    #[test]
    fn test_missing_subtree_is_reported() {
        let mut nbc = sample();
        if let Some(props) = nbc
            .container_service
            .as_mut()
            .and_then(|cs| cs.properties.as_mut())
        {
            props.agent_pool_profiles.clear();
        }
        let err = nbc.set_distro(distro::MARINER_V2_GEN2).unwrap_err();
        assert_eq!(
            err,
            MutationError::MissingField("containerService.properties.agentPoolProfiles[0]")
        );
    }

    #[test]
    fn test_json_shape_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json["containerService"]["properties"]["orchestratorProfile"]
            ["kubernetesConfig"]["networkPlugin"]
            .is_string());
        let back: NodeBootstrappingConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
    }
}
