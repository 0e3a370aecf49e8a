//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::effective(global)?;
            // Plain output is the TOML as it would sit on disk
            let out = match global.output {
                OutputFormat::Plain => cfg.to_toml()?,
                format => output::render_single(format, &cfg, |_| String::new())?,
            };
            output::print_output(out.trim_end())
        }
        ConfigCommand::Path => {
            output::print_output(&config::active_path(global).display().to_string())
        }
    }
}
