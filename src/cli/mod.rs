//! CLI module for netops-gate
//!
//! Provides command-line interface for:
//! - serve: Load config and run the HTTP API
//! - check-config: Validate a config file and its keys
//! - inspect-job: Verify a job ticket and print its claims

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, inspect_job, run, run_command, serve};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_response_to};
