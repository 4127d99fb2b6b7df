//! vocabsync CLI: keep a triple store's SKOS vocabularies in step with the
//! job ledger.
//!
//! Downloads the vocabularies the ledger marks ready, repairs them into
//! SKOS, replaces their named graphs in the store, and writes each result
//! back to the ledger.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = commands::load(&cli)?;
    commands::init_tracing(&cli, &config)?;
    commands::run(cli, config).await
}
