//! netops-gate - risk-gated command execution and change control for
//! network devices and edge agents

pub mod audit;
pub mod change_control;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod edge;
pub mod errors;
pub mod gateway;
pub mod governance;
pub mod http_server;
pub mod jobs;
pub mod policy;
pub mod principal;
pub mod redaction;
pub mod replay;
pub mod risk;
pub mod signing;

pub use errors::{GateError, GateResult};
