//! ImmoRadar CLI: discovery crawler for Tunisian real-estate websites.
//!
//! Finds candidate domains through search and certificate logs, validates
//! them, and keeps the results in a local libSQL database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
