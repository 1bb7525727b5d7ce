//! Parcel CLI: natural-language search and analysis over a property dataset
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

use anyhow::Result;
use clap::Parser as _;
use cli::{Cli, Commands};

mod cli;
mod handlers;
mod output;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = handlers::load_config(&cli)?;
    handlers::init_logging(&loaded.config, cli.log_file)?;
    loaded.report();

    match cli.command {
        Commands::Query { text } => handlers::handle_query(loaded.config, &text).await,
        Commands::Repl => handlers::handle_repl(loaded.config).await,
        Commands::Config { full } => handlers::handle_config(&loaded, full),
    }
}
