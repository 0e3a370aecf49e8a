//! CLI configuration: a thin layer over `nsdnet_config` that applies the
//! `GlobalOpts` flag overrides (--host, --port, --client-id).

use std::path::PathBuf;
use std::time::Duration;

use nsdnet_config::{Config, DriverSection, load_config};
use nsdnet_core::ConnectionConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a connected command needs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub driver: DriverSection,
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.driver.poll_interval_ms)
    }
}

/// The file the CLI reads: `--config` if given, else the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(nsdnet_config::config_path)
}

/// Load the layered config and apply flag overrides on top.
///
/// Precedence: flag > `NSDNET_*` env > file > built-in defaults.
pub fn effective(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = load_config(global.config.as_deref())?;
    if let Some(ref host) = global.host {
        cfg.server.host.clone_from(host);
    }
    if let Some(port) = global.port {
        cfg.server.port = port;
    }
    if let Some(ref id) = global.client_id {
        cfg.server.client_id.clone_from(id);
    }
    Ok(cfg)
}

/// Resolve validated connection settings for a connected command.
pub fn resolve(global: &GlobalOpts) -> Result<Settings, CliError> {
    let cfg = effective(global)?;
    let connection = cfg.to_connection_config()?;
    Ok(Settings {
        connection,
        driver: cfg.driver,
    })
}
