//! personagraph CLI: ask a persona grounded in its own work history.
//!
//! Questions are classified, matched against dated experience records and a
//! vector index of skills, and answered in the persona's usual tone.

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
