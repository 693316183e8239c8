//! CLI-specific error types
//!
//! All CLI errors are fatal: main prints them and exits non-zero.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::signing::SignatureError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (files, stdout)
    IoError,
    /// Server failed to start or crashed
    BootFailed,
    /// Job ticket did not verify
    InvalidJob,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "GATE_CLI_CONFIG_ERROR",
            Self::IoError => "GATE_CLI_IO_ERROR",
            Self::BootFailed => "GATE_CLI_BOOT_FAILED",
            Self::InvalidJob => "GATE_CLI_INVALID_JOB",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidJob, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<SignatureError> for CliError {
    fn from(e: SignatureError) -> Self {
        Self::invalid_job(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CliError::config_error("auth.jwt_secret is required");
        assert_eq!(err.to_string(), "GATE_CLI_CONFIG_ERROR: auth.jwt_secret is required");
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_conversions() {
        let err: CliError = SignatureError::Expired.into();
        assert_eq!(err.code_str(), "GATE_CLI_INVALID_JOB");
        assert_eq!(err.message(), "Job expired");

        let err: CliError = ConfigError::Invalid("bad".to_string()).into();
        assert_eq!(err.code_str(), "GATE_CLI_CONFIG_ERROR");
    }
}
