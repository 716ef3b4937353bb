use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stratum",
    version,
    about = "Hierarchical agent execution with human-in-the-loop coordination"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Workspace directory the task is bound to
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Path to config file (replaces the global config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding persisted context/stack files
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a task with a top-level agent
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// The task instruction
        #[arg(short, long)]
        input: String,

        /// Top-level agent name
        #[arg(short, long)]
        agent: Option<String>,

        /// Model name (e.g., "llama3.2", "qwen2.5:7b")
        #[arg(short, long)]
        model: Option<String>,

        /// Discard any interrupted state before starting
        #[arg(long)]
        force_new: bool,

        /// Allow mutating tools without confirmation (`--auto-mode false`
        /// forces confirmations even when config enables auto mode)
        #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
        auto_mode: Option<bool>,

        /// Emit JSONL events on stdout and read control commands from stdin
        #[arg(long)]
        jsonl: bool,
    },
    /// Relaunch the interrupted task recorded for a workspace
    Resume {
        #[command(flatten)]
        common: CommonArgs,

        /// Allow mutating tools without confirmation (`--auto-mode false`
        /// forces confirmations even when config enables auto mode)
        #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
        auto_mode: Option<bool>,

        /// Emit JSONL events on stdout and read control commands from stdin
        #[arg(long)]
        jsonl: bool,
    },
    /// Clear a workspace's persisted context and stack
    Reset {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Show whether a workspace has an interrupted task
    Status {
        #[command(flatten)]
        common: CommonArgs,

        /// Print the raw resume record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive front end hosting runs in child processes
    Chat {
        #[command(flatten)]
        common: CommonArgs,

        /// Top-level agent name
        #[arg(short, long)]
        agent: Option<String>,

        /// Allow mutating tools without confirmation (`--auto-mode false`
        /// forces confirmations even when config enables auto mode)
        #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
        auto_mode: Option<bool>,
    },
    /// Show the merged configuration, or edit a config file with `--set`
    Config {
        #[command(flatten)]
        common: CommonArgs,

        /// Assignment to write, e.g. `hil.timeout_secs=600` (repeatable).
        /// Written to the `--config` file if given, else `<workspace>/stratum.toml`
        #[arg(long, value_name = "SECTION.KEY=VALUE")]
        set: Vec<String>,
    },
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Run { common, .. }
            | Commands::Resume { common, .. }
            | Commands::Reset { common }
            | Commands::Status { common, .. }
            | Commands::Chat { common, .. }
            | Commands::Config { common, .. } => common,
        }
    }
}
