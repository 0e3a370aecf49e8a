// ── Device proxies ──
//
// Caller-side stand-ins for remote devices. A proxy reads its caches
// directly and sends requests through a weak handle on the session, so it
// never keeps a connection alive on its own.

mod nsdnet;
mod position2d;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use nsdnet_api::{DeviceAddress, RequestBody, ServerError};
use tokio::sync::watch;

use crate::capability::Capability;
use crate::config::QueuePolicy;
use crate::error::CoreError;
use crate::session::Session;

pub use nsdnet::NsdNetProxy;
pub use position2d::Position2dProxy;

/// A proxy type that can be registered on a [`Connection`](crate::Connection).
pub trait DeviceProxy: Sized {
    /// Device kind this proxy speaks for.
    const KIND: u16;

    /// Build the proxy plus the capabilities that feed its caches, in the
    /// order they are offered each frame.
    fn attach(handle: ProxyHandle, queue: &QueuePolicy) -> (Vec<Capability>, Self);

    fn handle(&self) -> &ProxyHandle;
}

/// A proxy's binding to its address and session.
#[derive(Debug, Clone)]
pub struct ProxyHandle {
    address: DeviceAddress,
    session: Weak<Session>,
    attached: Arc<AtomicBool>,
    last_error: watch::Receiver<Option<ServerError>>,
}

impl ProxyHandle {
    pub(crate) fn new(
        address: DeviceAddress,
        session: Weak<Session>,
        attached: Arc<AtomicBool>,
        last_error: watch::Receiver<Option<ServerError>>,
    ) -> Self {
        Self {
            address,
            session,
            attached,
            last_error,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// `false` once the proxy was unregistered or its connection released.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire) && self.session.strong_count() > 0
    }

    /// Last error the server reported for this device, if any.
    pub fn last_error(&self) -> Option<ServerError> {
        self.last_error.borrow().clone()
    }

    pub(crate) fn request(&self, body: RequestBody) -> Result<(), CoreError> {
        let stale = || CoreError::StaleProxy {
            address: self.address,
        };
        if !self.attached.load(Ordering::Acquire) {
            return Err(stale());
        }
        let session = self.session.upgrade().ok_or_else(stale)?;
        session.request(self.address, body)
    }
}
