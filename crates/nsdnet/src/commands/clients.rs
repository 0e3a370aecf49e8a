//! `nsdnet clients`: print the server's client directory.

use crate::cli::{DeviceArgs, GlobalOpts};
use crate::commands::util;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &DeviceArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let (mut conn, proxy) = util::open(settings, args.index).await?;

    let answer = match proxy.request_client_list() {
        Ok(()) => {
            util::await_answer(&mut conn, args.wait(), "listclients", || proxy.client_list_answer()).await
        }
        Err(e) => Err(e.into()),
    };
    conn.close().await;

    let list = answer?;
    let out = output::render_list(global.output, list.as_slice(), Clone::clone)?;
    output::print_output(&out)
}
