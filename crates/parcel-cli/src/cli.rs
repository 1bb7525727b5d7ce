use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the parcel CLI
#[derive(Parser, Debug)]
#[command(name = "parcel", version)]
#[command(about = "Ask questions about property data in plain language", long_about = None)]
pub struct Cli {
    /// Config file; created with defaults if missing [default: ~/.parcel/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Dataset JSON export (overrides `dataset.path`)
    #[arg(long, global = true)]
    pub dataset: Option<PathBuf>,

    /// Directory analysis scripts run in (overrides `analysis.work_dir`)
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Write logs to `<work dir>/.parcel/debug.log` instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single query
    Query {
        /// The question, e.g. "Find 2BHK houses in London"
        text: String,
    },

    /// Read queries from stdin until EOF or `exit`
    Repl,

    /// Show configuration
    Config {
        /// Print the full configuration as TOML
        #[arg(long)]
        full: bool,
    },
}
