//! Output formatting.

use colored::Colorize;
use nodecheck_orchestrator::{RunReport, ScenarioResult, ScenarioStatus};
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// JSON.
    Json,
}

#[derive(Debug, Tabled)]
struct ResultRow {
    #[tabled(rename = "Scenario")]
    scenario: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "VMSS")]
    vmss: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Elapsed")]
    elapsed: String,
    #[tabled(rename = "Logs")]
    logs: String,
}

fn colored_status(status: ScenarioStatus) -> String {
    match status {
        ScenarioStatus::Passed => "passed".green().to_string(),
        ScenarioStatus::Failed => "failed".red().to_string(),
        ScenarioStatus::Skipped => "skipped".yellow().to_string(),
    }
}

impl From<&ScenarioResult> for ResultRow {
    fn from(r: &ScenarioResult) -> Self {
        Self {
            scenario: r.scenario.clone(),
            status: colored_status(r.status),
            cluster: r.cluster.clone().unwrap_or_else(|| "-".to_string()),
            vmss: r.vmss_name.clone().unwrap_or_else(|| "-".to_string()),
            reason: r.reason_code.clone().unwrap_or_else(|| "-".to_string()),
            elapsed: format!("{:.1}s", r.elapsed_ms as f64 / 1000.0),
            logs: r
                .log_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let rows: Vec<ResultRow> = report.results.iter().map(ResultRow::from).collect();
            println!("{}", Table::new(rows));

            for r in report.results.iter().filter(|r| r.status == ScenarioStatus::Failed) {
                if let Some(reason) = &r.reason {
                    println!("{} {}: {}", "Failed:".red().bold(), r.scenario, reason);
                }
                if let Some(dir) = &r.diagnostics_dir {
                    println!("  diagnostics: {}", dir.display());
                }
                if let Some(e) = &r.diagnostics_error {
                    println!("  diagnostics unavailable: {}", e.dimmed());
                }
            }

            println!(
                "\nRun {}: {} passed, {} failed, {} skipped",
                report.run_id,
                report.passed().to_string().green(),
                report.failed().to_string().red(),
                report.skipped().to_string().yellow(),
            );
            if let Some(fatal) = &report.fatal {
                println!("{} {}", "Run halted:".red().bold(), fatal);
            }
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct ScenarioRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Mutates cluster")]
    pub mutates_cluster: bool,
    #[tabled(rename = "Description")]
    pub description: String,
}

pub fn print_scenarios(rows: &[ScenarioRow], format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => print_json(rows),
    }
}

fn print_json<T: Serialize + ?Sized>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} failed to encode output: {e}", "Error:".red().bold()),
    }
}
