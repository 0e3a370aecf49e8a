// ── Runtime connection configuration ──
//
// These types describe *how* to connect to an NSDNet server and how the
// per-proxy message queues behave. They never touch disk: the binary loads
// a file through nsdnet-config and hands a `ConnectionConfig` in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// Queue capacity used when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16_384;

/// Longest client id a server will store.
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// What a full message queue does with a new arrival.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Overflow {
    /// Evict the oldest queued message to make room.
    #[default]
    DropOldest,
    /// Discard the arriving message; the queue keeps what it has.
    DropNewest,
}

/// Bounds for each messaging proxy's inbound FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicy {
    pub capacity: usize,
    pub overflow: Overflow,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: Overflow::DropOldest,
        }
    }
}

/// Configuration for one connection to an NSDNet server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Id to register under. The server may hand back a `_`-suffixed variant.
    pub client_id: String,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub queue: QueuePolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6665,
            client_id: "nsdnet".into(),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            queue: QueuePolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Reject settings the server or the queues cannot work with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.host.trim().is_empty() {
            return Err(config_error("host must not be empty"));
        }
        if self.client_id.is_empty() || self.client_id.chars().any(char::is_whitespace) {
            return Err(config_error(format!(
                "client id '{}' must be a single non-empty word",
                self.client_id
            )));
        }
        if self.client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(config_error(format!(
                "client id is {} bytes, the limit is {MAX_CLIENT_ID_LEN}",
                self.client_id.len()
            )));
        }
        if self.queue.capacity == 0 {
            return Err(config_error("message queue capacity must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn link_config(&self) -> nsdnet_api::LinkConfig {
        let mut link = nsdnet_api::LinkConfig::new(self.client_id.clone());
        link.connect_timeout = self.connect_timeout;
        link.handshake_timeout = self.handshake_timeout;
        link
    }
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::Config {
        message: message.into(),
    }
}
