//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use nsdnet_config::ConfigError;
use nsdnet_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to nsdnet server at {addr}")]
    #[diagnostic(
        code(nsdnet::connection_failed),
        help(
            "Check that the server is running and reachable.\n\
             Address: {addr}\n\
             Override with --host/--port or NSDNET_HOST/NSDNET_PORT."
        )
    )]
    ConnectionFailed {
        addr: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Lost connection to the nsdnet server: {reason}")]
    #[diagnostic(code(nsdnet::connection_lost))]
    ConnectionLost { reason: String },

    #[error("No answer to {what} within {waited_ms}ms")]
    #[diagnostic(
        code(nsdnet::no_answer),
        help("The server may not support this request. Try a longer --wait-ms.")
    )]
    NoAnswer { what: String, waited_ms: u64 },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device error: {message}")]
    #[diagnostic(code(nsdnet::device))]
    Device { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nsdnet::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(nsdnet::no_config),
        help("Expected at: {path}\nRun without --config to use defaults.")
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(nsdnet::config),
        help("Run: nsdnet config show to inspect the effective configuration")
    )]
    Config { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON rendering failed: {0}")]
    #[diagnostic(code(nsdnet::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ConnectionLost { .. } => exit_code::CONNECTION,
            Self::NoAnswer { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoConfig { .. } | Self::Config { .. } => exit_code::CONFIG,
            Self::Device { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { addr, reason, .. } => CliError::ConnectionFailed {
                addr,
                source: reason.into(),
            },
            CoreError::Transport { reason } => CliError::ConnectionLost { reason },
            CoreError::NotConnected => CliError::ConnectionLost {
                reason: "the link is down".into(),
            },
            CoreError::InvalidRequest { field, reason } => CliError::Validation {
                field: field.into(),
                reason,
            },
            CoreError::Config { message } => CliError::Config { message },
            other @ (CoreError::DuplicateAddress { .. }
            | CoreError::NotRegistered { .. }
            | CoreError::StaleProxy { .. }) => CliError::Device {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
