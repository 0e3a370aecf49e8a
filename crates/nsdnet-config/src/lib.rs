//! Configuration for NSDNet tools.
//!
//! A TOML file (platform config dir, or an explicit path) layered over
//! built-in defaults and `NSDNET_*` environment variables, translated into
//! `nsdnet_core::ConnectionConfig`. The CLI applies its own flag overrides
//! on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nsdnet_core::{ConnectionConfig, QueuePolicy};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `NSDNET_SERVER__CLIENT_ID=robot7`.
pub const ENV_PREFIX: &str = "NSDNET_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    /// Bounds for each messaging proxy's inbound queue.
    #[serde(default)]
    pub queue: QueuePolicy,

    #[serde(default)]
    pub driver: DriverSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Id to register under; the server may append `_` if it is taken.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Seconds allowed for the TCP connect.
    #[serde(default = "default_timeout")]
    pub connect_timeout: u64,

    /// Seconds allowed for the greeting handshake.
    #[serde(default = "default_timeout")]
    pub handshake_timeout: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            connect_timeout: default_timeout(),
            handshake_timeout: default_timeout(),
        }
    }
}

/// Pacing for the `run` loop.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DriverSection {
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Milliseconds to sleep after an idle iteration.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    6665
}
fn default_client_id() -> String {
    "nsdnet".into()
}
fn default_timeout() -> u64 {
    5
}
fn default_iterations() -> u32 {
    100
}
fn default_poll_interval_ms() -> u64 {
    100
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "nsdnet", "nsdnet").map_or_else(
        || PathBuf::from(".nsdnet.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load defaults, then the TOML file, then `NSDNET_*` env vars.
///
/// The default path may be absent; an explicit `path` must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let config: Config = file_figment(&file)
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

/// Defaults layered with one TOML file, without the environment.
fn file_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

// ── Rendering ───────────────────────────────────────────────────────

impl Config {
    /// Pretty TOML, as it would appear on disk.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Translate into the runtime connection settings, validating them.
    pub fn to_connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let config = ConnectionConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            client_id: self.server.client_id.clone(),
            connect_timeout: Duration::from_secs(self.server.connect_timeout),
            handshake_timeout: Duration::from_secs(self.server.handshake_timeout),
            queue: self.queue,
        };
        config.validate().map_err(|e| ConfigError::Validation {
            field: "server".into(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }
}
