//! Error display for the CLI.

use colored::Colorize;
use nodecheck_orchestrator::scenario::TableError;
use nodecheck_orchestrator::OrchestratorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid fault {0:?}, expected SCENARIO=FAULT")]
    InvalidFault(String),

    #[error(
        "unknown fault kind {0:?}, expected one of: extension-failure, authorization-failure, \
         node-never-ready, pod-never-ready, pod-never-deleted, diagnostics-unavailable, delete-fails"
    )]
    UnknownFault(String),
}

/// Print an error with a hint where one helps.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(table_err) = err.downcast_ref::<TableError>() {
        match table_err {
            TableError::UnknownScenario(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `nodecheck scenarios` to list known scenarios.".yellow()
                );
            }
            TableError::Empty => {
                eprintln!("\n{}", "Hint: Check NODECHECK_SCENARIOS.".yellow());
            }
        }
    }

    if let Some(orch_err) = err.downcast_ref::<OrchestratorError>() {
        match orch_err {
            OrchestratorError::NoClusters(_) | OrchestratorError::ListClusters { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Check --resource-group and --subscription.".yellow()
                );
            }
            OrchestratorError::ResourceGroup { error, .. } if error.code == "AuthorizationFailed" => {
                eprintln!(
                    "\n{}",
                    "Hint: The identity running nodecheck may lack access to the subscription."
                        .yellow()
                );
            }
            OrchestratorError::Logs(_) => {
                eprintln!("\n{}", "Hint: Check that --log-dir is writable.".yellow());
            }
            _ => {}
        }
    }
}
