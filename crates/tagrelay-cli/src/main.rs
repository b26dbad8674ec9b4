//! tagrelay CLI - main entry point

use anyhow::Context;
use clap::Parser;

use tagrelay_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration: CLI args > env vars > config file > defaults
    let config = AppConfig::load_layered(
        cli.config.as_deref(),
        |key| std::env::var(key).ok(),
        cli.measurement_id.clone(),
        cli.data_dir.clone(),
    )?;

    // Tracker handles are single-threaded; keep every task on this thread
    let local = tokio::task::LocalSet::new();
    local
        .run_until(CommandDispatcher::execute(cli.command, config))
        .await
        .context("Command execution failed")?;

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
