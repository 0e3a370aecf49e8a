//! Command handlers, one module per subcommand.

pub mod clients;
pub mod config_cmd;
pub mod property;
pub mod run;
pub mod send;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;

/// Route a connected command to its handler.
pub async fn dispatch(cmd: Command, settings: &Settings, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(&args, settings).await,
        Command::Clients(args) => clients::handle(&args, settings, global).await,
        Command::Property(args) => property::get(&args, settings, global).await,
        Command::SetProperty(args) => property::set(&args, settings, global).await,
        Command::Send(args) => send::handle(&args, settings).await,
        Command::Config(_) | Command::Completions(_) => {
            unreachable!("handled before connecting")
        }
    }
}
