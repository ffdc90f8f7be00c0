//! Clap derive structures for the `wifipool` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wifipool -- discover, poll and switch a WiFiPool pool controller
#[derive(Debug, Parser)]
#[command(
    name = "wifipool",
    version,
    about = "Monitor and control WiFiPool pool controllers from the command line",
    long_about = "Talks to the WiFiPool cloud API on behalf of one pool account.\n\n\
        Run `wifipool setup` once to discover which channels carry pH, redox,\n\
        temperature, flow and switches; `poll` and `watch` then read them.",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "WIFIPOOL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account e-mail (overrides profile)
    #[arg(long, env = "WIFIPOOL_EMAIL", global = true)]
    pub email: Option<String>,

    /// Vendor API root (overrides profile)
    #[arg(long, env = "WIFIPOOL_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Setup state file (overrides the per-profile default)
    #[arg(long, env = "WIFIPOOL_STATE_FILE", global = true)]
    pub state_file: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WIFIPOOL_OUTPUT",
        default_value = "table",
        global = true
    )]
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

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "WIFIPOOL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and report the account identity
    Test,

    /// List the raw IO channels of the pool controller
    #[command(alias = "ls")]
    Discover,

    /// Discover and classify channels, then save the result
    Setup,

    /// Show the saved setup
    Status,

    /// Run one poll cycle and print the readings
    Poll,

    /// Poll continuously until interrupted
    Watch(WatchArgs),

    /// Switch a relay output on or off
    #[command(alias = "sw")]
    Switch(SwitchArgs),

    /// Evaluate a flow threshold against a fresh reading
    Flow(FlowArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Command Args ─────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in seconds (clamped to 15..=600)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SwitchArgs {
    /// Channel id or suffix (e.g. `o3`)
    pub channel: String,

    /// Desired state
    pub state: SwitchState,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Args)]
pub struct FlowArgs {
    /// Comparison to apply
    pub comparison: FlowComparison,

    /// Threshold (1 = flowing, 0 = not flowing for boolean sources)
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FlowComparison {
    Above,
    Below,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive profile setup
    Init,

    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store a profile's password in the system keyring
    SetPassword {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Forget the saved setup for the active profile
    ClearSetup,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
