//! `nsdnet send`: deliver one text message, then disconnect.

use crate::cli::SendArgs;
use crate::commands::util;
use crate::config::Settings;
use crate::error::CliError;

pub async fn handle(args: &SendArgs, settings: &Settings) -> Result<(), CliError> {
    let (conn, proxy) = util::open(settings, args.device.index).await?;

    let payload = args.text.clone().into_bytes();
    let sent = match args.to.as_deref() {
        Some(target) => proxy.send_message_to(target, payload),
        None => proxy.send_message(payload),
    };

    // close flushes the queued message before saying bye
    conn.close().await;
    sent?;
    tracing::info!(to = args.to.as_deref().unwrap_or("*"), "message sent");
    Ok(())
}
