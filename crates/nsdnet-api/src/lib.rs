// nsdnet-api: Async wire layer for NSDNet (addresses, frames, line codec, link tasks)

pub mod address;
pub mod error;
pub mod frame;
mod handshake;
pub mod link;
pub mod wire;

pub use address::{DeviceAddress, kind};
pub use error::Error;
pub use frame::{Frame, FrameBody, Pose2d, Request, RequestBody, ServerError, ServerErrorKind};
pub use handshake::Registration;
pub use link::{Link, LinkConfig, Outbound};
