//! sdsynth CLI: synthesize solution documents from regulatory and business
//! requirement documents.
//!
//! Runs the validate → gap-check → synthesize → refine → store pipeline
//! interactively and manages the change-request knowledge base.

mod commands;
mod session;

#[cfg(test)]
mod test_support;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is normal; the credential may come from the environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
