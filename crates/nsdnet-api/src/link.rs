//! Byte-stream link to an NSDNet server.
//!
//! After the greeting handshake, the link splits the stream and spawns two
//! background tasks:
//!
//! - a **reader** that parses inbound lines into [`Frame`]s and buffers them
//!   in an unbounded channel (answering `ping` with `pong` on the way), and
//! - a **writer** that drains an outbound byte queue onto the stream.
//!
//! Neither task touches any cache. The owner decides when to consume the
//! buffered frames, via [`Link::has_pending`], [`Link::recv`], and
//! [`Link::try_recv`].
//!
//! # Example
//!
//! ```rust,ignore
//! use nsdnet_api::{Link, LinkConfig};
//!
//! let mut link = Link::connect("localhost", 6665, &LinkConfig::new("robot1")).await?;
//! if link.has_pending() {
//!     while let Ok(frame) = link.try_recv() {
//!         println!("{} {}", frame.address, frame.body.kind_name());
//!     }
//! }
//! link.shutdown().await;
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::frame::{Frame, Request};
use crate::handshake::{self, Registration};
use crate::wire::{self, BYE, FrameReader, Inbound, PONG};

/// How long [`Link::shutdown`] waits for the writer to flush.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ── LinkConfig ───────────────────────────────────────────────────────

/// Connection tuning for a [`Link`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Id to register under. A `_` is appended on each "id in use" reply.
    pub client_id: String,
    /// Upper bound on the TCP connect. Default: 5s.
    pub connect_timeout: Duration,
    /// Upper bound on the whole greeting handshake. Default: 5s.
    pub handshake_timeout: Duration,
    /// How many ids to try before giving up. Default: 8.
    pub max_registration_attempts: u32,
}

impl LinkConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            max_registration_attempts: 8,
        }
    }
}

// ── Outbound ─────────────────────────────────────────────────────────

/// Cheap, cloneable handle onto the writer task's queue.
///
/// Sending never blocks: requests are encoded on the caller's side and
/// queued for the writer.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Outbound {
    /// Encode and queue a request.
    pub fn send(&self, request: &Request) -> Result<(), Error> {
        let bytes = wire::encode_request(request)?;
        trace!(address = %request.address, bytes = bytes.len(), "queueing request");
        self.send_raw(bytes)
    }

    fn send_raw(&self, bytes: Bytes) -> Result<(), Error> {
        self.tx.send(bytes).map_err(|_| Error::Closed)
    }

    /// `true` once the writer task has stopped. The writer stops on cancel,
    /// on a write error, and whenever the reader stops.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── Link ─────────────────────────────────────────────────────────────

/// A registered session with running reader and writer tasks.
///
/// Dropping the link cancels both tasks; [`shutdown`](Self::shutdown) also
/// says `bye` and waits for queued writes to flush.
pub struct Link {
    registration: Registration,
    outbound: Outbound,
    inbound: mpsc::UnboundedReceiver<Frame>,
    close_reason: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Link {
    /// Open a TCP connection to `host:port` and run the handshake.
    pub async fn connect(host: &str, port: u16, config: &LinkConfig) -> Result<Self, Error> {
        let addr = format!("{host}:{port}");
        info!(addr = %addr, "connecting to nsdnet server");

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout {
                stage: "connecting",
                timeout_ms: duration_ms(config.connect_timeout),
            })?
            .map_err(|source| Error::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        Self::establish(stream, config).await
    }

    /// Run the handshake over an already-open stream and spawn the tasks.
    pub async fn establish<S>(stream: S, config: &LinkConfig) -> Result<Self, Error>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(BufReader::new(read_half));

        let registration = tokio::time::timeout(
            config.handshake_timeout,
            handshake::perform(
                &mut reader,
                &mut write_half,
                &config.client_id,
                config.max_registration_attempts,
            ),
        )
        .await
        .map_err(|_| Error::Timeout {
            stage: "waiting for registration",
            timeout_ms: duration_ms(config.handshake_timeout),
        })??;

        info!(
            client_id = %registration.client_id,
            server_id = %registration.server_id,
            "registered with nsdnet server"
        );

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (reason_tx, reason_rx) = watch::channel(None);
        let outbound = Outbound { tx: out_tx };
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(write_loop(write_half, out_rx, cancel.clone()));
        let reader = tokio::spawn(read_loop(
            reader,
            in_tx,
            outbound.clone(),
            reason_tx,
            cancel.clone(),
        ));

        Ok(Self {
            registration,
            outbound,
            inbound: in_rx,
            close_reason: reason_rx,
            cancel,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// `true` if a frame is buffered, or if the reader has stopped (so the
    /// next receive reports the closure). Never consumes anything.
    pub fn has_pending(&self) -> bool {
        !self.inbound.is_empty() || self.inbound.is_closed()
    }

    /// Wait for the next buffered frame. `None` once the reader has stopped
    /// and everything buffered has been taken.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Why the reader stopped, once it has stopped on its own: the peer
    /// closing the stream, an I/O failure, or a protocol violation.
    /// `None` while the link is up or after a local shutdown.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.borrow().clone()
    }

    /// Take a buffered frame without waiting.
    pub fn try_recv(&mut self) -> Result<Frame, TryRecvError> {
        self.inbound.try_recv()
    }

    /// Say `bye`, flush queued writes, and stop both tasks.
    pub async fn shutdown(mut self) {
        if self.outbound.send_raw(Bytes::from_static(BYE)).is_err() {
            debug!("writer already stopped, skipping bye");
        }
        self.cancel.cancel();

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, writer).await.is_err() {
                warn!("writer did not flush within the shutdown grace period");
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        debug!("link shut down");
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Background tasks ─────────────────────────────────────────────────

async fn read_loop<R>(
    mut reader: FrameReader<R>,
    inbound: mpsc::UnboundedSender<Frame>,
    outbound: Outbound,
    close_reason: watch::Sender<Option<String>>,
    cancel: CancellationToken,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = reader.next_inbound() => {
                match next {
                    Ok(Some(Inbound::Frame(frame))) => {
                        trace!(address = %frame.address, kind = frame.body.kind_name(), "frame buffered");
                        if inbound.send(frame).is_err() {
                            // Receiver dropped: the link itself is gone.
                            break;
                        }
                    }
                    Ok(Some(Inbound::Ping)) => {
                        if outbound.send_raw(Bytes::from_static(PONG)).is_err() {
                            warn!("cannot answer ping, writer stopped");
                            break;
                        }
                    }
                    Ok(Some(Inbound::Control(line))) => {
                        warn!(line = %line, "unexpected control line after registration");
                    }
                    Ok(Some(Inbound::Malformed { line, reason })) => {
                        warn!(line = %line, reason = %reason, "skipping malformed line");
                    }
                    Ok(None) => {
                        info!("server closed the stream");
                        close_reason.send_replace(Some("connection closed by peer".into()));
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "link read failed");
                        close_reason.send_replace(Some(e.to_string()));
                        break;
                    }
                }
            }
        }
    }

    // A dead reader takes the writer down with it, so senders see the link as closed.
    cancel.cancel();
    debug!("reader task exiting");
}

async fn write_loop<W>(mut writer: W, mut queue: mpsc::UnboundedReceiver<Bytes>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Flush anything queued before cancellation, `bye` included.
                while let Ok(bytes) = queue.try_recv() {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                let _ = writer.flush().await;
                let _ = writer.shutdown().await;
                break;
            }
            next = queue.recv() => {
                let Some(bytes) = next else { break };
                let result = async {
                    writer.write_all(&bytes).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = result {
                    warn!(error = %e, "link write failed");
                    break;
                }
            }
        }
    }

    debug!("writer task exiting");
}
