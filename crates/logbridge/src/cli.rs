//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use logbridge_core::{constants, ClearMode, EchoPolicy};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logbridge")]
#[command(version, about = "Pipe, inspect and manage aggregated development logs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: logbridge.{toml,yaml,yml,json} in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Explicit aggregator address
    #[arg(long, global = true, env = constants::ENV_URL)]
    pub url: Option<String>,

    /// Token for the aggregator's ingestion and mutation routes
    #[arg(long, global = true, env = constants::ENV_TOKEN)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forward stdin lines to the aggregator (or print them if none is reachable)
    Pipe(PipeArgs),

    /// Show which aggregator would be used and whether it is up
    Status,

    /// Read the durable session log
    Logs(LogsArgs),

    /// Rotate the durable session log
    Rotate {
        /// Durable store base directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Clear the aggregator's ring buffer
    Clear(ClearArgs),

    /// Print the aggregator's ring buffer as text
    Show {
        /// Session id
        #[arg(short, long)]
        session: Option<String>,

        /// Display tag
        #[arg(short, long)]
        tag: Option<String>,
    },
}

#[derive(Args)]
pub struct PipeArgs {
    /// Level for every line
    #[arg(short, long, default_value = "log")]
    pub level: String,

    /// Session id (random when omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Display tag prepended to each line
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Project name
    #[arg(long)]
    pub project: Option<String>,

    /// Source annotation
    #[arg(long)]
    pub source: Option<String>,

    /// Local echo policy
    #[arg(long, value_enum)]
    pub echo: Option<EchoArg>,

    /// Lines per batch
    #[arg(long, default_value = "1")]
    pub batch: usize,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Durable store base directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Byte offset cursor to resume from
    #[arg(long, default_value = "0")]
    pub since_id: u64,

    /// File identity the cursor belongs to, so a rotated file is read to its end first
    #[arg(long)]
    pub file_id: Option<u64>,

    /// Only rows at or after this many milliseconds since the epoch
    #[arg(long)]
    pub since_ms: Option<i64>,

    /// Comma-separated levels (e.g. warn,error)
    #[arg(long)]
    pub level: Option<String>,

    /// Only rows from this project
    #[arg(long)]
    pub project: Option<String>,

    /// Only rows whose message contains this text
    #[arg(long)]
    pub contains: Option<String>,

    /// Maximum number of rows
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Filter rows by regex pattern
    #[arg(long)]
    pub grep: Option<String>,

    /// Keep printing new rows
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(Args)]
pub struct ClearArgs {
    /// `global`, `session:<id>`, `project:<name>`, or a bare session id
    pub scope: Option<String>,

    /// Delete entries instead of hiding them behind a baseline
    #[arg(long)]
    pub hard: bool,
}

impl ClearArgs {
    pub fn mode(&self) -> ClearMode {
        if self.hard {
            ClearMode::Hard
        } else {
            ClearMode::Soft
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EchoArg {
    Auto,
    Always,
    Never,
}

impl From<EchoArg> for EchoPolicy {
    fn from(arg: EchoArg) -> Self {
        match arg {
            EchoArg::Auto => EchoPolicy::Auto,
            EchoArg::Always => EchoPolicy::Always,
            EchoArg::Never => EchoPolicy::Never,
        }
    }
}
