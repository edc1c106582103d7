//! CLI argument parsing for the reindexer.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reindexer
///
/// Copies documents from source indices into a newly created index.
#[derive(Parser, Debug)]
#[command(name = "reindexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default in the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more job payload files concurrently
    Run {
        /// Job payload files (JSON)
        #[arg(required = true)]
        jobs: Vec<PathBuf>,

        /// Override the engine URL
        #[arg(short, long)]
        engine_url: Option<String>,
    },

    /// Check that the engine is reachable
    Health {
        /// Override the engine URL
        #[arg(short, long)]
        engine_url: Option<String>,
    },

    /// Parse and validate job payload files without contacting the engine
    Validate {
        #[arg(required = true)]
        jobs: Vec<PathBuf>,
    },
}
