//! Built-in scenarios.

use nodecheck_datamodel::{
    distro, ClusterModel, MutationError, NodeBootstrappingConfiguration, NETWORK_PLUGIN_AZURE,
    NETWORK_PLUGIN_KUBENET, NETWORK_POLICY_CALICO,
};

use super::Scenario;
use crate::clients::VmssSpec;

/// Image key used when a scenario does not override the image.
pub const DEFAULT_IMAGE_KEY: &str = "ubuntu2204";

const IMAGE_GALLERY: &str = "/subscriptions/8ecadfc9-d1a3-4ea4-b844-0d9f87e4d7c8/resourceGroups/aksvhdtestbuildrg/providers/Microsoft.Compute/galleries/PackerSigGalleryEastUS/images";

/// Gallery image version for a node image key.
pub fn default_image_id(key: &str) -> Option<String> {
    let path = match key {
        "ubuntu2204" => "2204gen2containerd/versions/1.1704411049.2812",
        "marinerv2" => "CBLMarinerV2gen2/versions/1.1704411049.2812",
        _ => return None,
    };
    Some(format!("{IMAGE_GALLERY}/{path}"))
}

fn set_image(spec: &mut VmssSpec, key: &str) {
    if let Some(id) = default_image_id(key) {
        spec.image_id = id;
    }
}

/// Matches every cluster.
pub fn all_clusters(_: &ClusterModel) -> bool {
    true
}

pub fn network_plugin_kubenet_selector(cluster: &ClusterModel) -> bool {
    cluster.uses_network_plugin(NETWORK_PLUGIN_KUBENET)
}

pub fn network_plugin_kubenet_mutator(cluster: &mut ClusterModel) {
    cluster.network_plugin = NETWORK_PLUGIN_KUBENET.to_string();
}

pub fn network_plugin_azure_selector(cluster: &ClusterModel) -> bool {
    cluster.uses_network_plugin(NETWORK_PLUGIN_AZURE)
}

pub fn network_plugin_azure_mutator(cluster: &mut ClusterModel) {
    cluster.network_plugin = NETWORK_PLUGIN_AZURE.to_string();
}

fn ubuntu2204() -> Scenario {
    Scenario {
        name: "ubuntu2204",
        description: "Tests that an Ubuntu 22.04 node using containerd can be properly bootstrapped",
        cluster_selector: all_clusters,
        cluster_mutator: None,
        config_mutator: Some(|nbc: &mut NodeBootstrappingConfiguration| {
            nbc.set_distro(distro::UBUNTU_CONTAINERD_2204_GEN2)
        }),
        resource_mutator: Some(|spec: &mut VmssSpec| set_image(spec, "ubuntu2204")),
    }
}

// Only valid against a cluster created with --network-plugin=kubenet.
fn calico() -> Scenario {
    Scenario {
        name: "calico",
        description: "Tests an Ubuntu 22.04 node configured for Calico network policy",
        cluster_selector: network_plugin_kubenet_selector,
        cluster_mutator: Some(network_plugin_kubenet_mutator),
        config_mutator: Some(|nbc: &mut NodeBootstrappingConfiguration| {
            nbc.set_distro(distro::UBUNTU_CONTAINERD_2204_GEN2)?;
            nbc.set_network_policy(NETWORK_POLICY_CALICO)
        }),
        resource_mutator: Some(|spec: &mut VmssSpec| {
            set_image(spec, "ubuntu2204");
            spec.sku = "Standard_D4s_v3".to_string();
        }),
    }
}

fn marinerv2() -> Scenario {
    Scenario {
        name: "marinerv2",
        description: "Tests that a CBL-Mariner v2 node can be properly bootstrapped",
        cluster_selector: all_clusters,
        cluster_mutator: None,
        config_mutator: Some(|nbc: &mut NodeBootstrappingConfiguration| {
            nbc.set_distro(distro::MARINER_V2_GEN2)?;
            nbc.agent_pool_profile_mut()?.os_type = "Linux".to_string();
            Ok::<(), MutationError>(())
        }),
        resource_mutator: Some(|spec: &mut VmssSpec| set_image(spec, "marinerv2")),
    }
}

fn azurecni() -> Scenario {
    Scenario {
        name: "ubuntu2204-azurecni",
        description: "Tests an Ubuntu 22.04 node joining a cluster using Azure CNI",
        cluster_selector: network_plugin_azure_selector,
        cluster_mutator: Some(network_plugin_azure_mutator),
        config_mutator: Some(|nbc: &mut NodeBootstrappingConfiguration| {
            nbc.set_distro(distro::UBUNTU_CONTAINERD_2204_GEN2)?;
            nbc.pool_kubernetes_config_mut()?.network_plugin = NETWORK_PLUGIN_AZURE.to_string();
            nbc.kubelet_config
                .insert("--max-pods".to_string(), "30".to_string());
            Ok(())
        }),
        resource_mutator: Some(|spec: &mut VmssSpec| set_image(spec, "ubuntu2204")),
    }
}

/// Every built-in scenario, in run order.
pub fn catalog() -> Vec<Scenario> {
    vec![ubuntu2204(), calico(), marinerv2(), azurecni()]
}
