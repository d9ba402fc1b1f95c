//! coenroll CLI: bulk validation and enrollment of users into a registry.
//!
//! Validates enrollment CSV files and enrolls their users through the
//! registry's REST API, reusing existing identities where they exist.

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
