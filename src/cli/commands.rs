//! CLI command implementations

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::GatewayConfig;
use crate::http_server::{spawn_maintenance, AppState, HttpServer};
use crate::signing::{JobClaims, JobVerifier};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Main CLI entry point
///
/// Parses arguments, installs logging and dispatches to the command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(&cli.log_level)?;
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::CheckConfig { config } => check_config(&config),
        Command::InspectJob { public_key, token } => {
            let claims = inspect_job(&public_key, &token)?;
            write_response(serde_json::to_value(claims)?)
        }
    }
}

/// `RUST_LOG` wins over `--log-level`
fn init_logging(level: &str) -> CliResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .map_err(|e| CliError::config_error(format!("Invalid log filter '{level}': {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| CliError::boot_failed(format!("Failed to install logger: {e}")))
}

/// Load config, wire state and serve until the listener fails
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = GatewayConfig::load(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    let state = Arc::new(AppState::from_config(&config)?);
    let server = HttpServer::new(config.http.clone(), state.clone());
    let cleanup_every = Duration::from_secs(config.edge.nonce_cleanup_interval_secs);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        let maintenance = spawn_maintenance(state, cleanup_every);
        let served = server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)));
        maintenance.abort();
        served
    })
}

/// Validate config and signing keys, then report what would be served
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = GatewayConfig::load(config_path)?;
    config.load_signing_keys()?;

    write_response(json!({
        "valid": true,
        "listen": config.http.socket_addr(),
        "auditLog": config.audit_log_path,
        "jobTtlSeconds": config.edge.job_ttl_seconds,
        "pairingTtlMinutes": config.edge.pairing_ttl_minutes,
    }))
}

/// Verify a job ticket against a public key and return its claims
pub fn inspect_job(public_key: &Path, token: &str) -> CliResult<JobClaims> {
    let pem = fs::read(public_key).map_err(|e| {
        CliError::io_error(format!("Failed to read {}: {}", public_key.display(), e))
    })?;
    let verifier = JobVerifier::from_pem(&pem)?;
    Ok(verifier.verify(token.trim())?)
}
