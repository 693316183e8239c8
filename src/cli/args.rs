//! CLI argument definitions using clap
//!
//! Commands:
//! - netops-gate serve --config <path>
//! - netops-gate check-config --config <path>
//! - netops-gate inspect-job --public-key <pem> --token <jwt>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// netops-gate - risk-gated network command execution and change control
#[derive(Parser, Debug)]
#[command(name = "netops-gate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./netops-gate.json")]
        config: PathBuf,

        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a configuration file and its signing keys
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./netops-gate.json")]
        config: PathBuf,
    },

    /// Verify a job ticket and print its claims
    InspectJob {
        /// Controller public key (PEM)
        #[arg(long)]
        public_key: PathBuf,

        /// Signed job ticket
        #[arg(long)]
        token: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
