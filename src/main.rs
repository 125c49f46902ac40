// ABOUTME: Command-line entry point for magicdump
// ABOUTME: Parses options, sets up logging, then prepares and runs the backup

use anyhow::{Context, Result};
use magicdump::config::Cli;
use magicdump::logging::{self, Verbosity};
use magicdump::progress::Reporter;
use magicdump::Runner;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = match Cli::parse_with_passthrough(std::env::args()) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };
    let config = cli.into_config().context("Invalid configuration")?;

    if config.verbosity != Verbosity::Silent {
        println!("magicdump Version {}", env!("CARGO_PKG_VERSION"));
        println!();
    }
    logging::init(config.verbosity);

    let reporter = Reporter::new(config.verbosity != Verbosity::Silent);
    let runner = Runner::new(config, reporter);

    let jobs = runner.prepare().context("Prepare failed")?;
    let report = runner.run(&jobs).await;

    let failed = report.failed_jobs();
    if failed > 0 {
        tracing::error!("{} of {} dump job(s) failed", failed, report.results.len());
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
