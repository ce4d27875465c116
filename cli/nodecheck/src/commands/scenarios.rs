//! `nodecheck scenarios`.

use nodecheck_orchestrator::scenario::catalog;

use crate::output::{print_scenarios, OutputFormat, ScenarioRow};

pub fn list(format: OutputFormat) {
    let rows: Vec<ScenarioRow> = catalog()
        .into_iter()
        .map(|s| ScenarioRow {
            name: s.name.to_string(),
            mutates_cluster: s.cluster_mutator.is_some(),
            description: s.description.to_string(),
        })
        .collect();
    print_scenarios(&rows, format);
}
