//! memhack: inspect and patch 32-bit memory dumps through a memstruct schema.
//!
//! Output goes to stdout as JSON; logs go to stderr.

mod cli;
mod commands;
mod memory;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs to stderr so stdout stays clean for JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    commands::run(cli).inspect_err(|e| tracing::error!("memhack failed: {:#}", e))
}
