//! Suite configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use nodecheck_poll::PollConfig;

/// Timeouts for the health validation sequence.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub node_ready: PollConfig,
    pub pod_ready: PollConfig,
    pub pod_deleted: PollConfig,
    pub probe_image: String,
    pub namespace: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            node_ready: PollConfig::new(Duration::from_secs(10 * 60), Duration::from_secs(5)),
            pod_ready: PollConfig::new(Duration::from_secs(5 * 60), Duration::from_secs(5)),
            pod_deleted: PollConfig::new(Duration::from_secs(2 * 60), Duration::from_secs(5)),
            probe_image: "mcr.microsoft.com/oss/nginx/nginx:1.21.6".to_string(),
            namespace: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub fetch: PollConfig,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            fetch: PollConfig::new(Duration::from_secs(3 * 60), Duration::from_secs(10)),
        }
    }
}

/// Defaults for the create request, before the scenario's resource mutator.
#[derive(Debug, Clone)]
pub struct VmssDefaults {
    pub sku: String,
    pub capacity: u32,
    pub admin_username: String,
}

impl Default for VmssDefaults {
    fn default() -> Self {
        Self {
            sku: "Standard_DS2_v2".to_string(),
            capacity: 1,
            admin_username: "azureuser".to_string(),
        }
    }
}

/// Configuration of one run.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub subscription: String,
    pub location: String,
    /// Resource group holding the test clusters.
    pub resource_group: String,
    /// Scenario names to run; empty means all.
    pub scenarios_to_run: Vec<String>,
    pub log_dir: PathBuf,
    pub max_concurrency: usize,
    /// Seed for cluster choice and resource names; random when unset.
    pub seed: Option<u64>,
    pub health: HealthConfig,
    pub diagnostics: DiagnosticsConfig,
    pub vmss: VmssDefaults,
}

pub const DEFAULT_LOCATION: &str = "eastus";
pub const DEFAULT_LOG_DIR: &str = "scenario-logs";
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Resource group name used when none is configured.
pub fn default_resource_group(location: &str) -> String {
    format!("nodecheck-e2e-{location}")
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            subscription: String::new(),
            location: DEFAULT_LOCATION.to_string(),
            resource_group: default_resource_group(DEFAULT_LOCATION),
            scenarios_to_run: Vec::new(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            seed: None,
            health: HealthConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            vmss: VmssDefaults::default(),
        }
    }
}

impl SuiteConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let subscription = lookup("NODECHECK_SUBSCRIPTION").unwrap_or_default();

        let location =
            lookup("NODECHECK_LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let resource_group = lookup("NODECHECK_RESOURCE_GROUP")
            .unwrap_or_else(|| default_resource_group(&location));

        let scenarios_to_run = lookup("NODECHECK_SCENARIOS")
            .map(|s| parse_list(&s))
            .unwrap_or_default();

        let log_dir = lookup("NODECHECK_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        let max_concurrency = match lookup("NODECHECK_MAX_CONCURRENCY") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid NODECHECK_MAX_CONCURRENCY: {v:?}"))?,
            None => DEFAULT_MAX_CONCURRENCY,
        };

        let seed = lookup("NODECHECK_SEED")
            .map(|v| {
                v.parse()
                    .with_context(|| format!("invalid NODECHECK_SEED: {v:?}"))
            })
            .transpose()?;

        let config = Self {
            subscription,
            location,
            resource_group,
            scenarios_to_run,
            log_dir,
            max_concurrency,
            seed,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_concurrency > 0, "max concurrency must be at least 1");
        anyhow::ensure!(!self.location.is_empty(), "location must not be empty");
        anyhow::ensure!(
            !self.resource_group.is_empty(),
            "resource group must not be empty"
        );
        Ok(())
    }
}

/// Split a comma separated list, dropping blanks.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SuiteConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.location, "eastus");
        assert_eq!(config.resource_group, "nodecheck-e2e-eastus");
        assert_eq!(config.max_concurrency, 8);
        assert!(config.scenarios_to_run.is_empty());
        assert!(config.seed.is_none());
        assert_eq!(config.health.node_ready.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_overrides() {
        let config = SuiteConfig::from_lookup(lookup(&[
            ("NODECHECK_LOCATION", "westus2"),
            ("NODECHECK_SCENARIOS", "calico, ubuntu2204,,"),
            ("NODECHECK_MAX_CONCURRENCY", "2"),
            ("NODECHECK_SEED", "42"),
        ]))
        .unwrap();
        assert_eq!(config.resource_group, "nodecheck-e2e-westus2");
        assert_eq!(config.scenarios_to_run, vec!["calico", "ubuntu2204"]);
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(SuiteConfig::from_lookup(lookup(&[("NODECHECK_MAX_CONCURRENCY", "0")])).is_err());
        assert!(SuiteConfig::from_lookup(lookup(&[("NODECHECK_MAX_CONCURRENCY", "x")])).is_err());
        assert!(SuiteConfig::from_lookup(lookup(&[("NODECHECK_SEED", "-1")])).is_err());
    }
}
