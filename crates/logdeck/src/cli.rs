//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logdeck")]
#[command(version, about = "Log dashboard server: query, paginate and live-tail log files")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server options when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (logdeck.toml/yaml/json in the working directory by default)
    #[arg(short, long, env = "LOGDECK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory scanned for *.log sources
    #[arg(long, env = "LOGDECK_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Output in JSON format instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeArgs),

    /// Print one page of log entries
    Query(QueryArgs),

    /// Follow log entries as they are written
    Tail(TailArgs),

    /// List known log sources
    Sources,
}

#[derive(Args, Clone, Default)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "LOGDECK_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "LOGDECK_PORT")]
    pub port: Option<u16>,

    /// Directory of dashboard assets
    #[arg(long, env = "LOGDECK_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Allowed CORS origin (default: http://localhost:3000)
    #[arg(long)]
    pub cors_origin: Option<String>,
}

/// Filters shared by `query` and `tail`
#[derive(Args, Clone, Default)]
pub struct FilterArgs {
    /// Minimum severity (trace, debug, info, warn, error, fatal)
    #[arg(short, long)]
    pub severity: Option<String>,

    /// Restrict to these sources (repeat or comma-separate)
    #[arg(long = "source", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Case-insensitive text the message must contain
    #[arg(short, long)]
    pub text: Option<String>,

    /// Earliest timestamp (RFC 3339, inclusive)
    #[arg(long)]
    pub from: Option<String>,

    /// Latest timestamp (RFC 3339, inclusive)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Entries per page
    #[arg(short = 'n', long)]
    pub page_size: Option<usize>,

    /// Resume from a cursor printed by a previous page
    #[arg(long)]
    pub cursor: Option<String>,

    /// asc or desc
    #[arg(long)]
    pub order: Option<String>,
}

#[derive(Args)]
pub struct TailArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Recent entries to print before following
    #[arg(short = 'n', long, default_value = "10")]
    pub lines: usize,
}
