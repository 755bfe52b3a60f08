//! Clap derive structures for the `beacon` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// beacon -- live incident view and alerting for dispatch servers
#[derive(Debug, Parser)]
#[command(
    name = "beacon",
    version,
    about = "Watch dispatch incidents and raise priority alerts from the terminal",
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
    /// Server profile to use
    #[arg(long, short = 'p', env = "BEACON_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Dispatch server URL (overrides profile)
    #[arg(long, short = 's', env = "BEACON_SERVER", global = true)]
    pub server: Option<String>,

    /// Bearer token
    #[arg(long, env = "BEACON_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one id per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream the live incident view and raise alerts until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Fetch active incidents once
    #[command(alias = "ls")]
    Incidents(IncidentsArgs),

    /// Send a broadcast to personnel and wait for the server acknowledgement
    Broadcast(BroadcastArgs),

    /// Manage the persisted sound preference
    Sound(SoundArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

/// Membership filter shared by `watch` and `incidents`.
#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// Only these statuses (repeatable, e.g. REPORTED, IN_PROGRESS)
    #[arg(long = "status", value_name = "STATUS")]
    pub statuses: Vec<String>,

    /// Only these priorities (repeatable: low, medium, high, critical)
    #[arg(long = "priority", value_name = "PRIORITY")]
    pub priorities: Vec<String>,

    /// Only these incident types (repeatable)
    #[arg(long = "type", value_name = "TYPE")]
    pub types: Vec<String>,

    /// Keep RESOLVED and CLOSED incidents in the view
    #[arg(long)]
    pub include_closed: bool,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.priorities.is_empty()
            && self.types.is_empty()
            && !self.include_closed
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Silence the terminal bell for this session
    #[arg(long)]
    pub mute: bool,

    /// Skip the push channel and rely on periodic resync only
    #[arg(long)]
    pub pull_only: bool,

    /// Steady resync interval in seconds
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct IncidentsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct BroadcastArgs {
    /// Broadcast title
    pub title: String,

    /// Broadcast body
    pub message: String,

    /// Broadcast type
    #[arg(long = "type", default_value = "general")]
    pub kind: String,

    /// Recipient ids (repeatable, empty means everyone)
    #[arg(long = "target", value_name = "ID")]
    pub targets: Vec<String>,

    /// Seconds to wait for the push channel to connect
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,
}

#[derive(Debug, Args)]
pub struct SoundArgs {
    #[command(subcommand)]
    pub command: SoundCommand,
}

#[derive(Debug, Subcommand)]
pub enum SoundCommand {
    /// Enable alert sounds
    On,
    /// Disable alert sounds
    Off,
    /// Show the current preference
    Status,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config and state file locations
    Path,
    /// Print the effective configuration (tokens redacted)
    Show,
}
