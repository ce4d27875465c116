//! Scenarios and the run's scenario table.

mod catalog;

use std::sync::Arc;

use nodecheck_datamodel::{ClusterModel, MutationError, NodeBootstrappingConfiguration};
use thiserror::Error;

use crate::clients::VmssSpec;

pub use catalog::{
    all_clusters, catalog, default_image_id, network_plugin_azure_mutator,
    network_plugin_azure_selector, network_plugin_kubenet_mutator,
    network_plugin_kubenet_selector, DEFAULT_IMAGE_KEY,
};

/// Predicate over cluster properties.
pub type ClusterSelectorFn = fn(&ClusterModel) -> bool;

/// Idempotent transform bringing a cluster into the required shape.
pub type ClusterMutatorFn = fn(&mut ClusterModel);

/// Transform of the scenario's private copy of the node configuration.
pub type ConfigMutatorFn = fn(&mut NodeBootstrappingConfiguration) -> Result<(), MutationError>;

/// Transform of the create request, e.g. image or SKU overrides.
pub type ResourceMutatorFn = fn(&mut VmssSpec);

/// A named test case.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub cluster_selector: ClusterSelectorFn,
    pub cluster_mutator: Option<ClusterMutatorFn>,
    pub config_mutator: Option<ConfigMutatorFn>,
    pub resource_mutator: Option<ResourceMutatorFn>,
}

impl Scenario {
    /// Apply the config mutator to `config`, if the scenario has one.
    pub fn mutate_config(
        &self,
        config: &mut NodeBootstrappingConfiguration,
    ) -> Result<(), MutationError> {
        match self.config_mutator {
            Some(mutator) => mutator(config),
            None => Ok(()),
        }
    }

    pub fn mutate_resource(&self, spec: &mut VmssSpec) {
        if let Some(mutator) = self.resource_mutator {
            mutator(spec);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("no scenarios selected")]
    Empty,
}

/// Scenarios selected for a run, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTable {
    scenarios: Vec<Arc<Scenario>>,
}

impl ScenarioTable {
    /// Build the table from the built-in catalog. An empty `names` selects
    /// every scenario.
    pub fn new(names: &[String]) -> Result<Self, TableError> {
        Self::from_catalog(catalog(), names)
    }

    /// Build the table from an explicit catalog.
    pub fn from_catalog(catalog: Vec<Scenario>, names: &[String]) -> Result<Self, TableError> {
        let wanted: Vec<&str> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();

        for name in &wanted {
            if !catalog.iter().any(|s| s.name == *name) {
                return Err(TableError::UnknownScenario(name.to_string()));
            }
        }

        let scenarios: Vec<Arc<Scenario>> = catalog
            .into_iter()
            .filter(|s| wanted.is_empty() || wanted.contains(&s.name))
            .map(Arc::new)
            .collect();

        if scenarios.is_empty() {
            return Err(TableError::Empty);
        }

        Ok(Self { scenarios })
    }

    pub fn scenarios(&self) -> &[Arc<Scenario>] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn into_vec(self) -> Vec<Arc<Scenario>> {
        self.scenarios
    }
}
