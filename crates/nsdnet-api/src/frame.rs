// ── Frame and request types ──
//
// Frames flow server -> client and are dispatched by address.
// Requests flow client -> server and are fire-and-forget.

use bytes::Bytes;
use strum::{Display, EnumString, IntoStaticStr};

use crate::address::DeviceAddress;

// ── Inbound ──────────────────────────────────────────────────────────

/// One unit of inbound data addressed to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub address: DeviceAddress,
    pub body: FrameBody,
}

/// Sub-type and payload of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Answer to a property get. The server echoes the key it answered.
    PropertyValue { key: String, value: String },
    /// Full list of peer ids currently connected to the server.
    ClientList(Vec<String>),
    /// A message delivered from another peer.
    Message { source: String, payload: Bytes },
    /// Latest planar pose of a position device.
    Telemetry(Pose2d),
    /// The server rejected something this device asked for.
    ServerError(ServerError),
}

impl FrameBody {
    /// Short sub-type name, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::PropertyValue { .. } => "property-response",
            Self::ClientList(_) => "client-list-response",
            Self::Message { .. } => "message",
            Self::Telemetry(_) => "telemetry-update",
            Self::ServerError(_) => "server-error",
        }
    }
}

/// Planar pose: position in metres, yaw in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// Error codes a server reports in `error` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ServerErrorKind {
    ClientIdInUse,
    InvalidParam,
    InvalidParamCount,
    UnknownCommand,
    AlreadyRegistered,
    UnknownClient,
    PropertyNotExist,
    Unknown,
}

impl ServerErrorKind {
    /// Map a raw wire code; anything unrecognised becomes [`Unknown`](Self::Unknown).
    pub fn from_code(code: &str) -> Self {
        code.parse().unwrap_or(Self::Unknown)
    }
}

/// A server-side error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub kind: ServerErrorKind,
    /// The code exactly as sent, preserved for unknown kinds.
    pub code: String,
    pub message: String,
}

// ── Outbound ─────────────────────────────────────────────────────────

/// One outbound request, written by the link's writer task.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub address: DeviceAddress,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Ask the server to start delivering frames for this address.
    Subscribe,
    /// Stop delivering frames for this address.
    Unsubscribe,
    GetProperty { key: String },
    SetProperty { key: String, value: String },
    ListClients,
    /// `target: None` broadcasts to every peer.
    Send { target: Option<String>, payload: Bytes },
    /// Velocity command for a position device: speed in m/s, heading in radians.
    SetSpeed { speed: f64, heading: f64 },
}
