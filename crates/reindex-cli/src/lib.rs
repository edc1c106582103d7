//! Reindexer CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, health, validate)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    health_command, health_report, init_logging, load_settings, read_job, run_command, run_jobs,
    validate_command,
};
