// ── Connection ──
//
// One link to an NSDNet server plus the dispatch table that routes inbound
// frames to registered device slots. All cache mutation happens inside
// `read`, on the caller's task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use nsdnet_api::{DeviceAddress, Frame, Link, RequestBody};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capability::{DeviceSlot, Handled};
use crate::config::{ConnectionConfig, QueuePolicy};
use crate::error::CoreError;
use crate::proxy::{DeviceProxy, ProxyHandle};
use crate::session::{ConnectionState, Session};

/// A live connection to an NSDNet server.
///
/// Proxies registered here hold only a weak handle back; dropping the
/// connection (or calling [`close`](Self::close)) detaches every one of
/// them, on every exit path.
///
/// ```rust,ignore
/// let mut conn = Connection::connect(&ConnectionConfig::default()).await?;
/// let proxy: NsdNetProxy = conn.register(0)?;
/// proxy.request_property("self.id")?;
/// conn.read().await?;
/// println!("{:?}", proxy.property());
/// conn.close().await;
/// ```
pub struct Connection {
    link: Option<Link>,
    session: Arc<Session>,
    slots: BTreeMap<DeviceAddress, DeviceSlot>,
    queue: QueuePolicy,
    client_id: String,
}

impl Connection {
    /// Connect over TCP and register with the server.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let addr = format!("{}:{}", config.host, config.port);
        let link = Link::connect(&config.host, config.port, &config.link_config())
            .await
            .map_err(|e| CoreError::connection_failed(addr, &e))?;
        Ok(Self::from_link(link, config))
    }

    /// Register with the server over an already-open byte stream.
    pub async fn from_stream<S>(stream: S, config: &ConnectionConfig) -> Result<Self, CoreError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;
        let link = Link::establish(stream, &config.link_config())
            .await
            .map_err(|e| CoreError::connection_failed("<stream>", &e))?;
        Ok(Self::from_link(link, config))
    }

    fn from_link(link: Link, config: &ConnectionConfig) -> Self {
        let client_id = link.registration().client_id.clone();
        let session = Arc::new(Session::new(link.outbound()));
        Self {
            link: Some(link),
            session,
            slots: BTreeMap::new(),
            queue: config.queue,
            client_id,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Subscribe to state changes (e.g. to notice a failure from another task).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.subscribe_state()
    }

    /// The id the server accepted, which may differ from the configured one.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Registered addresses, in order.
    pub fn addresses(&self) -> impl Iterator<Item = DeviceAddress> + '_ {
        self.slots.keys().copied()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Bind a new proxy at `(P::KIND, index)` and subscribe to its frames.
    pub fn register<P: DeviceProxy>(&mut self, index: u16) -> Result<P, CoreError> {
        let address = DeviceAddress::new(P::KIND, index);
        if self.slots.contains_key(&address) {
            return Err(CoreError::DuplicateAddress { address });
        }

        let attached = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = watch::channel(None);
        let handle = ProxyHandle::new(
            address,
            Arc::downgrade(&self.session),
            Arc::clone(&attached),
            error_rx,
        );
        let (capabilities, proxy) = P::attach(handle, &self.queue);
        let slot = DeviceSlot::new(address, capabilities, error_tx, attached);

        if let Err(e) = proxy.handle().request(RequestBody::Subscribe) {
            slot.detach();
            return Err(e);
        }

        self.slots.insert(address, slot);
        info!(address = %address, "device registered");
        Ok(proxy)
    }

    /// Drop the slot at `address`, detach its proxy, and unsubscribe.
    pub fn unregister(&mut self, address: DeviceAddress) -> Result<(), CoreError> {
        let slot = self
            .slots
            .remove(&address)
            .ok_or(CoreError::NotRegistered { address })?;
        slot.detach();

        if let Err(e) = self.session.request(address, RequestBody::Unsubscribe) {
            debug!(address = %address, error = %e, "unsubscribe not sent");
        }
        info!(address = %address, "device unregistered");
        Ok(())
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// `true` if a frame is waiting, or the link has closed and the next
    /// [`read`](Self::read) will report it. Never consumes or applies data.
    pub fn peek(&self) -> bool {
        self.link.as_ref().is_some_and(Link::has_pending)
    }

    /// Wait for at least one frame, then drain and apply everything buffered.
    ///
    /// Returns how many frames were drained. If the link is closed before or
    /// during the drain, this fails with [`CoreError::Transport`] carrying
    /// the reason the link went down; frames
    /// already applied stay applied and the connection moves to
    /// [`ConnectionState::Failed`].
    pub async fn read(&mut self) -> Result<usize, CoreError> {
        if self.state() == ConnectionState::Failed {
            return Err(self.transport_error());
        }
        let Some(link) = self.link.as_mut() else {
            return Err(CoreError::NotConnected);
        };

        let Some(first) = link.recv().await else {
            return Err(self.fail());
        };
        dispatch(&self.slots, first);
        let mut drained = 1;

        loop {
            match link.try_recv() {
                Ok(frame) => {
                    dispatch(&self.slots, frame);
                    drained += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Err(self.fail()),
            }
        }

        debug!(frames = drained, "drained inbound frames");
        Ok(drained)
    }

    fn fail(&self) -> CoreError {
        let err = self.transport_error();
        if self.state() == ConnectionState::Connected {
            warn!(error = %err, "connection to the nsdnet server lost");
            self.session.set_state(ConnectionState::Failed);
        }
        err
    }

    fn transport_error(&self) -> CoreError {
        let reason = self
            .link
            .as_ref()
            .and_then(Link::close_reason)
            .unwrap_or_else(|| "connection closed by peer".into());
        CoreError::Transport { reason }
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Say `bye`, stop the link, and detach every proxy.
    pub async fn close(mut self) {
        self.release();
        if let Some(link) = self.link.take() {
            link.shutdown().await;
        }
        info!("connection closed");
    }

    fn release(&mut self) {
        for slot in self.slots.values() {
            slot.detach();
        }
        self.slots.clear();
        self.session.set_state(ConnectionState::Closed);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.link.is_some() {
            debug!("connection dropped without close");
        }
        self.release();
    }
}

fn dispatch(slots: &BTreeMap<DeviceAddress, DeviceSlot>, frame: Frame) {
    let Frame { address, body } = frame;
    let Some(slot) = slots.get(&address) else {
        debug!(address = %address, kind = body.kind_name(), "no device at address, frame dropped");
        return;
    };
    if let Handled::Declined(body) = slot.apply(body) {
        warn!(address = %address, kind = body.kind_name(), "device cannot handle frame, dropped");
    }
}
