// nsdnet-core: Connection, dispatch table, and typed device proxies on top of nsdnet-api.

pub mod capability;
pub mod config;
pub mod connection;
pub mod error;
pub mod proxy;
mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{ClientList, Message, PropertyValue};
pub use config::{ConnectionConfig, Overflow, QueuePolicy};
pub use connection::Connection;
pub use error::CoreError;
pub use proxy::{DeviceProxy, NsdNetProxy, Position2dProxy, ProxyHandle};
pub use session::ConnectionState;

// Wire types callers commonly need alongside the proxies.
pub use nsdnet_api::{DeviceAddress, Pose2d, ServerError, ServerErrorKind, kind};
