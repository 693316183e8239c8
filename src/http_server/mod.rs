//! # HTTP Server Module
//!
//! Axum API for the gateway. Every route maps [`crate::errors::GateError`]
//! onto `{error, code}` with the matching status.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/edge/*` - Pairing, job creation and the agent job protocol
//! - `/ssh/*` - SSH sessions and templated commands
//! - `/tools/config/push` - Config push
//! - `/governance/*` - Policies, approvals, maintenance windows

pub mod config;
pub mod edge_routes;
pub mod errors;
pub mod extract;
pub mod governance_routes;
pub mod health_routes;
pub mod server;
pub mod ssh_routes;
pub mod tools_routes;

pub use config::HttpServerConfig;
pub use errors::{ApiResult, ErrorResponse};
pub use server::{spawn_maintenance, AppState, HttpServer};
