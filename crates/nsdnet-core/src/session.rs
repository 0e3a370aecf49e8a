// ── Shared session state ──
//
// The part of a connection that proxies reach through their weak handle:
// the outbound queue and the observable connection state.

use nsdnet_api::{DeviceAddress, Outbound, Request, RequestBody};
use strum::Display;
use tokio::sync::watch;
use tracing::trace;

use crate::error::CoreError;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    /// Released by `close` or drop.
    Closed,
    /// The stream broke; only `close` or drop remain useful.
    Failed,
}

#[derive(Debug)]
pub(crate) struct Session {
    outbound: Outbound,
    state: watch::Sender<ConnectionState>,
}

impl Session {
    pub(crate) fn new(outbound: Outbound) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self { outbound, state }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Queue one request for `address`. Never waits for the server.
    pub(crate) fn request(&self, address: DeviceAddress, body: RequestBody) -> Result<(), CoreError> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::Closed => return Err(CoreError::StaleProxy { address }),
            ConnectionState::Failed => return Err(CoreError::NotConnected),
        }
        if self.outbound.is_closed() {
            return Err(CoreError::NotConnected);
        }

        trace!(address = %address, "request queued");
        self.outbound.send(&Request { address, body }).map_err(CoreError::from)
    }
}
