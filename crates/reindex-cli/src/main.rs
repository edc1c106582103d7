//! Reindexer
//!
//! Copies documents from one or more source indices into a newly created
//! index, rebuilding nested documents and rewriting field types on the way.
//!
//! # Usage
//!
//! ```bash
//! reindexer run job.json [more.json ...] [--engine-url URL]
//! reindexer health [--engine-url URL]
//! reindexer validate job.json [more.json ...]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reindexer/config.toml)
//! 3. Environment variables (REINDEX_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use reindex_cli::{health_command, run_command, validate_command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { jobs, engine_url } => {
            run_command(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                &jobs,
                engine_url.as_deref(),
            )
            .await?;
        }
        Commands::Health { engine_url } => {
            health_command(
                cli.config.as_deref(),
                cli.log_level.as_deref(),
                engine_url.as_deref(),
            )
            .await?;
        }
        Commands::Validate { jobs } => {
            validate_command(cli.config.as_deref(), &jobs)?;
        }
    }

    Ok(())
}
