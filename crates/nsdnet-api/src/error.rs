use thiserror::Error;

/// Top-level error type for the `nsdnet-api` crate.
///
/// Covers connection establishment, the greeting handshake, line-protocol
/// parsing, and the background link tasks. `nsdnet-core` maps these into
/// the caller-facing taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect failed (refused, unreachable, DNS failure, etc.)
    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connect or handshake did not finish in time.
    #[error("Timed out after {timeout_ms}ms while {stage}")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    // ── Handshake ───────────────────────────────────────────────────
    /// The server sent something other than the expected greeting sequence.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server speaks a protocol revision this client does not.
    #[error("Incompatible protocol version '{got}' (expected '{expected}')")]
    IncompatibleVersion { expected: &'static str, got: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A line could not be parsed into a frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An outbound request carries a field the line protocol cannot encode.
    #[error("Invalid {field}: {reason}")]
    InvalidRequest { field: &'static str, reason: String },

    // ── Link ────────────────────────────────────────────────────────
    /// Underlying stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link tasks have stopped; nothing more can be sent or received.
    #[error("Link closed")]
    Closed,
}

impl Error {
    /// Returns `true` if retrying the connect from scratch might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::TimedOut
            ),
            Self::Timeout { .. } | Self::Closed => true,
            _ => false,
        }
    }
}
