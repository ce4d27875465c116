//! nodecheck - node bootstrapping validation runner
//!
//! Runs the scenario table against a pool of clusters and prints a
//! per-scenario summary. The exit status is 0 only when no scenario failed
//! and no fatal error stopped the run.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod error;
mod output;

use commands::Cli;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("NODECHECK_LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let json = std::env::var("NODECHECK_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    // Logs go to stderr so the summary on stdout stays machine readable.
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error::print_error(&e);
            std::process::exit(1);
        }
    }
}
