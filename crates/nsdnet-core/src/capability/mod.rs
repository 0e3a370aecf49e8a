// ── Device capabilities ──
//
// The dispatch side of a proxy. Each capability owns the write half of one
// cache (a `watch` sender or the shared message queue); the proxy keeps the
// read half. `Connection::read` is the only caller of `handle_frame`, so
// caches change only while the caller is draining.

mod directory;
mod message_queue;
mod property;
mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nsdnet_api::{DeviceAddress, FrameBody, ServerError};
use tokio::sync::watch;
use tracing::warn;

pub use directory::{ClientList, DirectoryCell};
pub use message_queue::{Message, MessageQueueCell};
pub use property::{PropertyCell, PropertyValue};
pub use telemetry::TelemetryCell;

pub(crate) use message_queue::MessageQueue;

/// Outcome of offering a frame to a capability.
#[derive(Debug)]
pub enum Handled {
    Applied,
    /// Not this capability's sub-type; the body is handed back untouched.
    Declined(FrameBody),
}

/// Uniform entry point for applying one inbound frame body.
///
/// Implementations never block and never issue requests.
pub trait HandleFrame {
    fn handle_frame(&self, body: FrameBody) -> Handled;
}

/// The closed set of things a device slot can do with a frame.
#[derive(Debug)]
pub enum Capability {
    Property(PropertyCell),
    Directory(DirectoryCell),
    MessageQueue(MessageQueueCell),
    Telemetry(TelemetryCell),
}

impl HandleFrame for Capability {
    fn handle_frame(&self, body: FrameBody) -> Handled {
        match self {
            Self::Property(cell) => cell.handle_frame(body),
            Self::Directory(cell) => cell.handle_frame(body),
            Self::MessageQueue(cell) => cell.handle_frame(body),
            Self::Telemetry(cell) => cell.handle_frame(body),
        }
    }
}

// ── DeviceSlot ───────────────────────────────────────────────────────

/// Dispatch-table entry for one registered address.
#[derive(Debug)]
pub(crate) struct DeviceSlot {
    address: DeviceAddress,
    capabilities: Vec<Capability>,
    last_error: watch::Sender<Option<ServerError>>,
    attached: Arc<AtomicBool>,
}

impl DeviceSlot {
    pub(crate) fn new(
        address: DeviceAddress,
        capabilities: Vec<Capability>,
        last_error: watch::Sender<Option<ServerError>>,
        attached: Arc<AtomicBool>,
    ) -> Self {
        Self {
            address,
            capabilities,
            last_error,
            attached,
        }
    }

    /// Offer a body to each capability in order; the first taker wins.
    ///
    /// Server error reports are understood by every slot.
    pub(crate) fn apply(&self, mut body: FrameBody) -> Handled {
        if let FrameBody::ServerError(err) = body {
            warn!(
                address = %self.address,
                code = %err.code,
                message = %err.message,
                "server reported an error for device"
            );
            self.last_error.send_replace(Some(err));
            return Handled::Applied;
        }

        for capability in &self.capabilities {
            match capability.handle_frame(body) {
                Handled::Applied => return Handled::Applied,
                Handled::Declined(back) => body = back,
            }
        }
        Handled::Declined(body)
    }

    /// Cut the proxy loose; its requests fail from now on.
    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}
