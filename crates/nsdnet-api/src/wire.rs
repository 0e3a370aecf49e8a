//! Line-protocol codec.
//!
//! Every line is UTF-8 text terminated by `\n`. Device-addressed lines start
//! with `@kind:index`; the only lines with a binary tail are `msgbin`, whose
//! header carries the exact payload length.
//!
//! ```text
//! server -> client                      client -> server
//! greetings <id> nsdnet <ver>           greetings <id> nsdnet 0001
//! registered | error <code> <msg>       @k:i subscribe | unsubscribe
//! ping                                  @k:i propget <key>
//! @k:i propval <key> <value...>         @k:i propset <key> <value>
//! @k:i listclients [<id>...]            @k:i listclients
//! @k:i msgbin <src> <len>\n<bytes>      @k:i msgbin <dst|*> <len>\n<bytes>
//! @k:i msgtext <src>\n<text>\n          @k:i speed <speed> <heading>
//! @k:i pose <x> <y> <yaw>               pong | bye
//! @k:i error <code> [<msg...>]
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::address::DeviceAddress;
use crate::error::Error;
use crate::frame::{Frame, FrameBody, Pose2d, Request, RequestBody, ServerError, ServerErrorKind};

/// Protocol name announced in greetings.
pub const PROTOCOL_NAME: &str = "nsdnet";

/// The only protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "0001";

/// Upper bound on a single `msgbin` payload.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Upper bound on a single line, terminator included.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Wildcard target meaning "every peer".
const BROADCAST_TARGET: &str = "*";

pub const PONG: &[u8] = b"pong\n";
pub const BYE: &[u8] = b"bye\n";

// ── Encoding ─────────────────────────────────────────────────────────

/// The greeting a client sends back to register under `client_id`.
pub fn client_greeting(client_id: &str) -> Result<Bytes, Error> {
    validate_token("client id", client_id)?;
    Ok(Bytes::from(format!(
        "greetings {client_id} {PROTOCOL_NAME} {PROTOCOL_VERSION}\n"
    )))
}

/// Encode a request into the bytes written to the stream.
///
/// Fails if a key, value, or target cannot be represented on one line.
pub fn encode_request(request: &Request) -> Result<Bytes, Error> {
    let addr = request.address;
    let line = match &request.body {
        RequestBody::Subscribe => format!("@{addr} subscribe\n"),
        RequestBody::Unsubscribe => format!("@{addr} unsubscribe\n"),
        RequestBody::GetProperty { key } => {
            validate_token("property key", key)?;
            format!("@{addr} propget {key}\n")
        }
        RequestBody::SetProperty { key, value } => {
            validate_token("property key", key)?;
            if value.contains(['\n', '\r']) {
                return Err(Error::InvalidRequest {
                    field: "property value",
                    reason: "must not contain line breaks".into(),
                });
            }
            format!("@{addr} propset {key} {value}\n")
        }
        RequestBody::ListClients => format!("@{addr} listclients\n"),
        RequestBody::Send { target, payload } => {
            let target = match target.as_deref() {
                Some(BROADCAST_TARGET) => {
                    return Err(Error::InvalidRequest {
                        field: "message target",
                        reason: "'*' is reserved for broadcast".into(),
                    });
                }
                Some(t) => {
                    validate_token("message target", t)?;
                    t
                }
                None => BROADCAST_TARGET,
            };
            if payload.len() > MAX_PAYLOAD_LEN {
                return Err(Error::InvalidRequest {
                    field: "message payload",
                    reason: format!("{} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit", payload.len()),
                });
            }
            let header = format!("@{addr} msgbin {target} {}\n", payload.len());
            let mut buf = BytesMut::with_capacity(header.len() + payload.len());
            buf.put_slice(header.as_bytes());
            buf.put_slice(payload);
            return Ok(buf.freeze());
        }
        RequestBody::SetSpeed { speed, heading } => {
            if !speed.is_finite() || !heading.is_finite() {
                return Err(Error::InvalidRequest {
                    field: "speed command",
                    reason: format!("speed {speed} and heading {heading} must be finite"),
                });
            }
            format!("@{addr} speed {speed} {heading}\n")
        }
    };
    Ok(Bytes::from(line))
}

fn validate_token(field: &'static str, value: &str) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::InvalidRequest {
            field,
            reason: "must not be empty".into(),
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRequest {
            field,
            reason: format!("'{value}' must not contain whitespace"),
        });
    }
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────

/// One decoded unit from the server stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// An addressed frame, ready for dispatch.
    Frame(Frame),
    /// Keepalive; must be answered with [`PONG`].
    Ping,
    /// Any other unaddressed line (greetings, registration replies, errors).
    Control(String),
    /// A line that could not be parsed. The stream is still in sync.
    Malformed { line: String, reason: String },
}

/// Result of parsing a header line, before any trailing payload is read.
enum Head {
    Ready(Inbound),
    Binary {
        address: DeviceAddress,
        source: String,
        len: usize,
    },
    Text {
        address: DeviceAddress,
        source: String,
    },
}

/// Reads [`Inbound`] units from a buffered byte stream.
///
/// Lines are read as raw bytes. Header lines are decoded lossily, so a
/// stray non-UTF-8 byte never desynchronises or kills the stream; the body
/// of a `msgtext` is kept byte for byte.
pub struct FrameReader<R> {
    inner: R,
    line: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
        }
    }

    /// Read one raw line without its terminator. `None` at end of stream.
    ///
    /// A line longer than [`MAX_LINE_LEN`] is a fatal protocol error.
    pub async fn read_raw_line(&mut self) -> Result<Option<&[u8]>, Error> {
        self.line.clear();
        let limit = u64::try_from(MAX_LINE_LEN + 1).unwrap_or(u64::MAX);
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.line)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        if n > MAX_LINE_LEN {
            return Err(Error::Protocol(format!(
                "line exceeds the {MAX_LINE_LEN} byte limit"
            )));
        }
        let mut end = self.line.len();
        while end > 0 && matches!(self.line[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        Ok(Some(&self.line[..end]))
    }

    /// Read one line as text, replacing invalid UTF-8. `None` at end of stream.
    pub async fn read_line(&mut self) -> Result<Option<String>, Error> {
        Ok(self
            .read_raw_line()
            .await?
            .map(|raw| String::from_utf8_lossy(raw).into_owned()))
    }

    /// Read the next unit. `None` at a clean end of stream.
    ///
    /// Errors are fatal to the stream: I/O failures, truncated payloads,
    /// overlong lines, and `msgbin` headers whose length cannot be trusted.
    pub async fn next_inbound(&mut self) -> Result<Option<Inbound>, Error> {
        loop {
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }

            let head = match parse_head(&line) {
                Ok(head) => head,
                Err(ParseFailure::Recoverable(reason)) => {
                    return Ok(Some(Inbound::Malformed { line, reason }));
                }
                Err(ParseFailure::Fatal(reason)) => {
                    return Err(Error::Protocol(format!("{reason} in '{line}'")));
                }
            };

            return match head {
                Head::Ready(inbound) => Ok(Some(inbound)),
                Head::Binary {
                    address,
                    source,
                    len,
                } => {
                    let mut payload = vec![0u8; len];
                    self.inner.read_exact(&mut payload).await.map_err(|e| {
                        if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            Error::Protocol(format!(
                                "stream ended inside a {len} byte message payload"
                            ))
                        } else {
                            Error::Io(e)
                        }
                    })?;
                    Ok(Some(Inbound::Frame(Frame {
                        address,
                        body: FrameBody::Message {
                            source,
                            payload: Bytes::from(payload),
                        },
                    })))
                }
                Head::Text { address, source } => {
                    let text = self.read_raw_line().await?.ok_or_else(|| {
                        Error::Protocol("stream ended before msgtext body".into())
                    })?;
                    Ok(Some(Inbound::Frame(Frame {
                        address,
                        body: FrameBody::Message {
                            source,
                            payload: Bytes::copy_from_slice(text),
                        },
                    })))
                }
            };
        }
    }
}

enum ParseFailure {
    Recoverable(String),
    Fatal(String),
}

/// Split off the first space-delimited token. Leading spaces are skipped;
/// the remainder starts right after the single separating space.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start_matches(' ');
    match s.split_once(' ') {
        Some((tok, rest)) => (tok, rest),
        None => (s, ""),
    }
}

fn parse_head(line: &str) -> Result<Head, ParseFailure> {
    let Some(addressed) = line.strip_prefix('@') else {
        if line.trim() == "ping" {
            return Ok(Head::Ready(Inbound::Ping));
        }
        return Ok(Head::Ready(Inbound::Control(line.to_owned())));
    };

    let (addr_tok, rest) = split_token(addressed);
    let address: DeviceAddress = addr_tok
        .parse()
        .map_err(|e: Error| ParseFailure::Recoverable(e.to_string()))?;
    let (command, rest) = split_token(rest);

    let body = match command {
        "propval" => {
            let (key, value) = split_token(rest);
            if key.is_empty() {
                return Err(ParseFailure::Recoverable("propval without a key".into()));
            }
            FrameBody::PropertyValue {
                key: key.to_owned(),
                value: value.to_owned(),
            }
        }
        "listclients" => FrameBody::ClientList(rest.split_whitespace().map(String::from).collect()),
        "msgbin" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let [source, len] = parts.as_slice() else {
                return Err(ParseFailure::Fatal(format!(
                    "msgbin expects 2 parameters, got {}",
                    parts.len()
                )));
            };
            let len: usize = len
                .parse()
                .map_err(|_| ParseFailure::Fatal(format!("invalid msgbin length '{len}'")))?;
            if len > MAX_PAYLOAD_LEN {
                return Err(ParseFailure::Fatal(format!(
                    "msgbin length {len} exceeds the {MAX_PAYLOAD_LEN} byte limit"
                )));
            }
            return Ok(Head::Binary {
                address,
                source: (*source).to_owned(),
                len,
            });
        }
        "msgtext" => {
            let (source, _) = split_token(rest);
            if source.is_empty() {
                return Err(ParseFailure::Fatal("msgtext without a source".into()));
            }
            return Ok(Head::Text {
                address,
                source: source.to_owned(),
            });
        }
        "pose" => {
            let values: Vec<f64> = rest
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|e| ParseFailure::Recoverable(format!("invalid pose value: {e}")))?;
            let [x, y, yaw] = values.as_slice() else {
                return Err(ParseFailure::Recoverable(format!(
                    "pose expects 3 values, got {}",
                    values.len()
                )));
            };
            FrameBody::Telemetry(Pose2d {
                x: *x,
                y: *y,
                yaw: *yaw,
            })
        }
        "error" => {
            let (code, message) = split_token(rest);
            FrameBody::ServerError(ServerError {
                kind: ServerErrorKind::from_code(code),
                code: code.to_owned(),
                message: message.to_owned(),
            })
        }
        "" => return Err(ParseFailure::Recoverable("addressed line without a command".into())),
        other => return Err(ParseFailure::Recoverable(format!("unknown command '{other}'"))),
    };

    Ok(Head::Ready(Inbound::Frame(Frame { address, body })))
}
