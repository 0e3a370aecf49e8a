// ── Greeting handshake ──
//
// server: greetings <server-id> nsdnet <version>
// client: greetings <client-id> nsdnet 0001
// server: registered | error clientidinuse ... | error <other> ...
//
// A client id already in use is retried with a `_` suffix.

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::Error;
use crate::frame::ServerErrorKind;
use crate::wire::{self, FrameReader, Inbound, PONG, PROTOCOL_NAME, PROTOCOL_VERSION};

/// Outcome of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Id the server announced in its greeting.
    pub server_id: String,
    /// Id the server accepted for this client (may carry `_` suffixes).
    pub client_id: String,
}

pub(crate) async fn perform<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    client_id: &str,
    max_attempts: u32,
) -> Result<Registration, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let greeting = next_control(reader, writer).await?;
    let tokens: Vec<&str> = greeting.split_whitespace().collect();
    let server_id = match tokens.as_slice() {
        ["greetings", server_id, name, version] if *name == PROTOCOL_NAME => {
            if *version != PROTOCOL_VERSION {
                return Err(Error::IncompatibleVersion {
                    expected: PROTOCOL_VERSION,
                    got: (*version).to_owned(),
                });
            }
            (*server_id).to_owned()
        }
        _ => {
            return Err(Error::Handshake(format!(
                "unexpected server greeting '{greeting}'"
            )));
        }
    };
    debug!(server_id = %server_id, "server greeting accepted");

    let mut id = client_id.to_owned();
    for attempt in 1..=max_attempts {
        writer.write_all(&wire::client_greeting(&id)?).await?;
        writer.flush().await?;

        let reply = next_control(reader, writer).await?;
        let (command, rest) = reply.split_once(' ').unwrap_or((reply.as_str(), ""));
        match command {
            "registered" => {
                return Ok(Registration {
                    server_id,
                    client_id: id,
                });
            }
            "error" => {
                let code = rest.split_whitespace().next().unwrap_or_default();
                if ServerErrorKind::from_code(code) != ServerErrorKind::ClientIdInUse {
                    return Err(Error::Handshake(format!(
                        "server rejected registration: {reply}"
                    )));
                }
                warn!(client_id = %id, attempt, "client id in use, retrying with suffix");
                id.push('_');
            }
            _ => {
                return Err(Error::Handshake(format!(
                    "unexpected registration reply '{reply}'"
                )));
            }
        }
    }

    Err(Error::Handshake(format!(
        "client id still in use after {max_attempts} attempts"
    )))
}

/// Next unaddressed line, answering pings along the way.
async fn next_control<R, W>(reader: &mut FrameReader<R>, writer: &mut W) -> Result<String, Error>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        match reader.next_inbound().await? {
            None => {
                return Err(Error::Handshake(
                    "server closed the connection during handshake".into(),
                ));
            }
            Some(Inbound::Ping) => {
                writer.write_all(PONG).await?;
                writer.flush().await?;
            }
            Some(Inbound::Control(line)) => return Ok(line),
            Some(Inbound::Frame(frame)) => {
                debug!(address = %frame.address, "ignoring frame received before registration");
            }
            Some(Inbound::Malformed { line, reason }) => {
                return Err(Error::Handshake(format!("{reason} in '{line}'")));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, BufReader};

    use super::*;

    async fn run(server_script: &'static [u8], attempts: u32) -> (Result<Registration, Error>, String) {
        let mut reader = FrameReader::new(BufReader::new(server_script));
        let (mut client_side, mut observer) = tokio::io::duplex(4096);
        let result = perform(&mut reader, &mut client_side, "bot", attempts).await;
        drop(client_side);
        let mut written = String::new();
        observer.read_to_string(&mut written).await.unwrap();
        (result, written)
    }

    #[tokio::test]
    async fn registers_first_time() {
        let (result, written) = run(b"greetings srv nsdnet 0001\nregistered\n", 3).await;
        assert_eq!(
            result.unwrap(),
            Registration {
                server_id: "srv".into(),
                client_id: "bot".into(),
            }
        );
        assert_eq!(written, "greetings bot nsdnet 0001\n");
    }

    #[tokio::test]
    async fn retries_with_suffix_when_id_taken() {
        let script = b"ping\ngreetings srv nsdnet 0001\nerror clientidinuse bot\nregistered\n";
        let (result, written) = run(script, 3).await;
        assert_eq!(result.unwrap().client_id, "bot_");
        assert_eq!(
            written,
            "pong\ngreetings bot nsdnet 0001\ngreetings bot_ nsdnet 0001\n"
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let script = b"greetings srv nsdnet 0001\nerror clientidinuse\nerror clientidinuse\n";
        let (result, _) = run(script, 2).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[tokio::test]
    async fn rejects_other_versions() {
        let (result, written) = run(b"greetings srv nsdnet 0002\n", 3).await;
        assert!(matches!(
            result,
            Err(Error::IncompatibleVersion { ref got, .. }) if got == "0002"
        ));
        assert!(written.is_empty());
    }

    #[tokio::test]
    async fn rejects_foreign_greeting() {
        let (result, _) = run(b"SSH-2.0-OpenSSH_9.6\n", 3).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }

    #[tokio::test]
    async fn eof_during_handshake_fails() {
        let (result, _) = run(b"greetings srv nsdnet 0001\n", 3).await;
        assert!(matches!(result, Err(Error::Handshake(_))));
    }
}
