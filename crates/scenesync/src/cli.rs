//! Clap derive structures for the `scenesync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// scenesync -- mirror and inspect a remote StudioPro session
#[derive(Debug, Parser)]
#[command(
    name = "scenesync",
    version,
    about = "Mirror and inspect a remote StudioPro session from the command line",
    long_about = "Connects to the StudioPro WebSocket server (RPC v1), keeps a live\n\
        mirror of scenes, sources, audio, outputs and transitions, and prints\n\
        snapshots or change notifications from it.",
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
    /// Remote profile to use
    #[arg(long, short = 'p', env = "SCENESYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// WebSocket server host (overrides profile)
    #[arg(long, short = 'H', env = "SCENESYNC_HOST", global = true)]
    pub host: Option<String>,

    /// WebSocket server port (overrides profile)
    #[arg(long, short = 'P', env = "SCENESYNC_PORT", global = true)]
    pub port: Option<u16>,

    /// WebSocket server password
    #[arg(long, env = "SCENESYNC_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SCENESYNC_OUTPUT",
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
    #[arg(long, env = "SCENESYNC_TIMEOUT", global = true)]
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
    /// Connect and print the mirrored state
    #[command(alias = "snap", alias = "s")]
    Snapshot(SnapshotArgs),

    /// Stay connected and print every change as it happens
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Send one raw request and print the response
    #[command(alias = "req")]
    Request(RequestArgs),

    /// List the scenes in one downstream-keyer tab
    Dsk(DskArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SNAPSHOT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Which part of the mirror to print
    #[arg(value_enum, default_value = "scenes")]
    pub section: Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Section {
    /// Scenes in remote order
    Scenes,
    /// Scene items per scene
    Items,
    /// Sources, with audio state when present
    Sources,
    /// Filters per source
    Filters,
    /// Available transitions
    Transitions,
    /// Generic outputs
    Outputs,
    /// Media playback status
    Media,
    /// Session singletons (program scene, stream, record, ...)
    Session,
    /// Performance counters
    Stats,
    /// Derived choice lists
    Choices,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long, short = 'd')]
    pub duration: Option<u64>,

    /// Also print stats, media and meter updates
    #[arg(long, short = 'a')]
    pub all: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REQUEST
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Request type, e.g. GetVersion or SetCurrentProgramScene
    pub request_type: String,

    /// Inline JSON request data
    #[arg(long, conflicts_with = "data_file")]
    pub data: Option<String>,

    /// Read JSON request data from a file
    #[arg(long, short = 'F')]
    pub data_file: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DSK
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DskArgs {
    /// Tab number, starting at 1
    #[arg(default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub tab: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a configuration value on the active profile
    Set {
        /// Profile key, e.g. "host", "port" or "media_interval_ms"
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
