//! CLI commands.

mod run;
mod scenarios;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// nodecheck - validate that node images bootstrap into working cluster members.
#[derive(Debug, Parser)]
#[command(name = "nodecheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run scenarios and print a summary.
    Run(run::RunCommand),

    /// List known scenarios.
    Scenarios,
}

impl Cli {
    /// Run the command and return the process exit code.
    pub async fn run(self) -> Result<i32> {
        match self.command {
            Commands::Run(cmd) => cmd.run(self.format).await,
            Commands::Scenarios => {
                scenarios::list(self.format);
                Ok(0)
            }
        }
    }
}
