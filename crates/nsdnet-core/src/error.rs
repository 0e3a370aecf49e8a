// ── Core error types ──
//
// Caller-facing errors from nsdnet-core. Consumers never see raw codec or
// stream errors; the `From<nsdnet_api::Error>` impl folds wire-layer
// failures into the connection taxonomy below.

use nsdnet_api::DeviceAddress;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// Connect-time failure. Fatal to that attempt; the caller may retry.
    #[error("Cannot connect to nsdnet server at {addr}: {reason}")]
    ConnectionFailed {
        addr: String,
        reason: String,
        /// Whether a fresh attempt might succeed (refused, reset, timed out).
        transient: bool,
    },

    /// The stream closed or broke while reading. Fatal to the connection.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// A request was issued while the link is down.
    #[error("Not connected to an nsdnet server")]
    NotConnected,

    // ── Registration errors ──────────────────────────────────────────
    #[error("Device address {address} is already registered on this connection")]
    DuplicateAddress { address: DeviceAddress },

    #[error("No device registered at {address}")]
    NotRegistered { address: DeviceAddress },

    /// Use of a proxy after its connection was closed or it was unregistered.
    #[error("Proxy for {address} is no longer attached to a connection")]
    StaleProxy { address: DeviceAddress },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// Build a [`ConnectionFailed`](Self::ConnectionFailed) for `addr` out of
    /// whatever stopped the connect or handshake.
    pub(crate) fn connection_failed(addr: impl Into<String>, err: &nsdnet_api::Error) -> Self {
        Self::ConnectionFailed {
            addr: addr.into(),
            reason: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<nsdnet_api::Error> for CoreError {
    fn from(err: nsdnet_api::Error) -> Self {
        match err {
            nsdnet_api::Error::Connect { ref addr, .. } => {
                let addr = addr.clone();
                CoreError::connection_failed(addr, &err)
            }
            nsdnet_api::Error::Timeout { .. }
            | nsdnet_api::Error::Handshake(_)
            | nsdnet_api::Error::IncompatibleVersion { .. } => {
                CoreError::connection_failed("<unknown>", &err)
            }
            nsdnet_api::Error::InvalidRequest { field, reason } => {
                CoreError::InvalidRequest { field, reason }
            }
            nsdnet_api::Error::Closed => CoreError::NotConnected,
            nsdnet_api::Error::Protocol(reason) => CoreError::Transport { reason },
            nsdnet_api::Error::Io(e) => CoreError::Transport {
                reason: e.to_string(),
            },
        }
    }
}
