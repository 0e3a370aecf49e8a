//! Clap derive structures for the `nsdnet` CLI.
//!
//! Defines the command tree, global flags, and shared argument groups.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nsdnet -- talk to an NSDNet server from the command line
#[derive(Debug, Parser)]
#[command(
    name = "nsdnet",
    version,
    about = "Query and message peers on an NSDNet simulation server",
    long_about = "Connects to an NSDNet server, registers device proxies, and exchanges\n\
        properties, client lists, and messages with other peers.\n\n\
        `run` drives the demonstration loop; the other commands are one-shot.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "NSDNET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long, short = 'H', env = "NSDNET_HOST", global = true)]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, short = 'P', env = "NSDNET_PORT", global = true)]
    pub port: Option<u16>,

    /// Client id to register under (overrides config)
    #[arg(long, env = "NSDNET_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NSDNET_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one value per line (default)
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the demonstration loop: introduce, list peers, then exchange messages
    Run(RunArgs),

    /// List the clients connected to the server
    #[command(alias = "ls")]
    Clients(DeviceArgs),

    /// Read a property (e.g. self.id, self.index)
    #[command(alias = "get")]
    Property(PropertyArgs),

    /// Write a property
    #[command(alias = "set")]
    SetProperty(SetPropertyArgs),

    /// Send a text message to every peer, or to one with --to
    Send(SendArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared argument groups ───────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Index of the messaging device to register
    #[arg(long, short = 'i', default_value_t = 0)]
    pub index: u16,

    /// How long to wait for the server's answer, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub wait_ms: u64,
}

impl DeviceArgs {
    pub fn wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wait_ms)
    }
}

// ── Command args ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Loop iterations (overrides config)
    #[arg(long, short = 'n')]
    pub iterations: Option<u32>,

    /// Sleep after an idle iteration, in milliseconds (overrides config)
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Seed for the random speed commands (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Also register a position device and set a random speed every 10 iterations
    #[arg(long)]
    pub drive: bool,
}

#[derive(Debug, Args)]
pub struct PropertyArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Property key, e.g. self.id
    pub key: String,
}

#[derive(Debug, Args)]
pub struct SetPropertyArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    pub key: String,

    pub value: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Deliver only to this client id
    #[arg(long)]
    pub to: Option<String>,

    /// Message text
    pub text: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
