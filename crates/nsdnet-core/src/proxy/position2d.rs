use nsdnet_api::{DeviceAddress, Pose2d, RequestBody, ServerError, kind};
use tokio::sync::watch;

use super::{DeviceProxy, ProxyHandle};
use crate::capability::{Capability, TelemetryCell};
use crate::config::QueuePolicy;
use crate::error::CoreError;

/// Proxy for a planar position device.
#[derive(Debug, Clone)]
pub struct Position2dProxy {
    handle: ProxyHandle,
    pose: watch::Receiver<Option<Pose2d>>,
}

impl DeviceProxy for Position2dProxy {
    const KIND: u16 = kind::POSITION2D;

    fn attach(handle: ProxyHandle, _queue: &QueuePolicy) -> (Vec<Capability>, Self) {
        let (cell, pose) = TelemetryCell::new();
        (vec![Capability::Telemetry(cell)], Self { handle, pose })
    }

    fn handle(&self) -> &ProxyHandle {
        &self.handle
    }
}

impl Position2dProxy {
    pub fn address(&self) -> DeviceAddress {
        self.handle.address()
    }

    /// Latest pose, `None` until the first telemetry frame.
    pub fn pose(&self) -> Option<Pose2d> {
        *self.pose.borrow()
    }

    pub fn x_pos(&self) -> Option<f64> {
        self.pose().map(|p| p.x)
    }

    pub fn y_pos(&self) -> Option<f64> {
        self.pose().map(|p| p.y)
    }

    pub fn yaw(&self) -> Option<f64> {
        self.pose().map(|p| p.yaw)
    }

    /// Command a speed (m/s) and heading (rad). Fire-and-forget.
    pub fn set_speed(&self, speed: f64, heading: f64) -> Result<(), CoreError> {
        self.handle.request(RequestBody::SetSpeed { speed, heading })
    }

    pub fn last_error(&self) -> Option<ServerError> {
        self.handle.last_error()
    }
}
