//! `nsdnet property` / `nsdnet set-property`.
//!
//! The server answers both with a `propval` for the key, so each command
//! waits for a value whose key matches the one asked about.

use nsdnet_core::PropertyValue;

use crate::cli::{GlobalOpts, PropertyArgs, SetPropertyArgs};
use crate::commands::util;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

pub async fn get(args: &PropertyArgs, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    let (mut conn, proxy) = util::open(settings, args.device.index).await?;
    let answer = match proxy.request_property(&args.key) {
        Ok(()) => util::wait_for_property(&mut conn, &proxy, &args.key, args.device.wait()).await,
        Err(e) => Err(e.into()),
    };
    conn.close().await;
    print(&answer?, global)
}

pub async fn set(
    args: &SetPropertyArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (mut conn, proxy) = util::open(settings, args.device.index).await?;
    let answer = match proxy.set_property(&args.key, &args.value) {
        Ok(()) => util::wait_for_property(&mut conn, &proxy, &args.key, args.device.wait()).await,
        Err(e) => Err(e.into()),
    };
    conn.close().await;
    print(&answer?, global)
}

fn print(value: &PropertyValue, global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_single(global.output, value, |p| p.value.clone())?;
    output::print_output(&out)
}
