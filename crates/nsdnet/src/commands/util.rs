//! Shared helpers for command handlers.

use std::time::Duration;

use tokio::time::Instant;

use nsdnet_core::{Connection, NsdNetProxy, PropertyValue};

use crate::config::Settings;
use crate::error::CliError;

/// Connect and register the messaging device at `index`.
pub async fn open(settings: &Settings, index: u16) -> Result<(Connection, NsdNetProxy), CliError> {
    let mut conn = Connection::connect(&settings.connection).await?;
    tracing::info!(client_id = conn.client_id(), "connected");
    match conn.register::<NsdNetProxy>(index) {
        Ok(proxy) => Ok((conn, proxy)),
        Err(e) => {
            conn.close().await;
            Err(e.into())
        }
    }
}

/// Read from `conn` until `probe` yields a value or `wait` runs out.
///
/// `probe` is checked before every read, so an answer that is already
/// cached returns without touching the socket.
pub async fn await_answer<T>(
    conn: &mut Connection,
    wait: Duration,
    what: &str,
    mut probe: impl FnMut() -> Option<T>,
) -> Result<T, CliError> {
    let deadline = Instant::now() + wait;
    loop {
        if let Some(answer) = probe() {
            return Ok(answer);
        }
        match tokio::time::timeout_at(deadline, conn.read()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(CliError::NoAnswer {
                    what: what.to_owned(),
                    waited_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
    }
}

/// Wait for the server's answer about `key` on `proxy`.
///
/// A server `error` for the device ends the wait as a device error.
pub async fn wait_for_property(
    conn: &mut Connection,
    proxy: &NsdNetProxy,
    key: &str,
    wait: Duration,
) -> Result<PropertyValue, CliError> {
    let what = format!("property '{key}'");
    let answer = await_answer(conn, wait, &what, || {
        if let Some(err) = proxy.last_error() {
            return Some(Err(err));
        }
        proxy.property().filter(|p| p.key == key).map(Ok)
    })
    .await?;

    answer.map_err(|err| CliError::Device {
        message: format!("server rejected {what}: {} {}", err.code, err.message),
    })
}
