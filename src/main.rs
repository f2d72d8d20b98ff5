//! rentalenrich - enrich movie-rental query results with live city data
//!
//! Reads query result rows, looks up temperature, air quality and country
//! data through a persistent expiring cache, and prints the reports.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rentalenrich::cli::{Cli, RunConfig};
use rentalenrich::commands;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig::from_cli(&cli)?;
    commands::run(&cli.command, &config).await?;

    Ok(())
}
