//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// bdl - Keep local directories in sync with remote file collections
#[derive(Parser, Debug)]
#[command(name = "bdl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level; RUST_LOG is used when not given
    #[arg(long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Number of parallel downloads
    #[arg(short, long, global = true, env = "BDL_JOBS")]
    pub jobs: Option<usize>,

    /// Run as if started in this directory
    #[arg(short = 'C', long = "dir", global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Options shared by `connect` and `clone`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ConnectArgs {
    /// Remote URL
    pub url: String,

    /// Local name; derived from the URL when omitted
    pub name: Option<String>,

    /// Filename template, e.g. "{position:04d}.{extension}"
    #[arg(short, long)]
    pub template: Option<String>,

    /// Engine option stored in the repository config (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub engine_config: Vec<(String, String)>,
}

/// Repository directories to operate on
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    /// Repository directories
    #[arg(default_value = ".")]
    pub repos: Vec<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Register a remote without downloading anything
    ///
    /// Examples:
    ///   bdl connect file:///srv/photos           # Creates ./photos
    ///   bdl co file:///srv/photos holiday        # Creates ./holiday
    ///   bdl connect URL --template "{position:04d}.{extension}"
    #[command(visible_alias = "co")]
    Connect(ConnectArgs),

    /// Connect and download everything
    Clone(ConnectArgs),

    /// Download items never downloaded before
    #[command(visible_alias = "up")]
    Update(Targets),

    /// Download every item again, overwriting local copies
    Stash(Targets),

    /// Restore items whose local file is gone
    Reset(Targets),

    /// Download everything not present locally
    Checkout(Targets),

    /// Rename downloaded files after a new template
    Rename {
        #[command(flatten)]
        targets: Targets,

        /// New filename template; the default template when omitted
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Show item counts per status
    Status {
        #[command(flatten)]
        targets: Targets,

        /// Also list the remote and report reachability
        #[arg(long)]
        remote: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List deleted items and downloaded files that went missing
    Diff(Targets),

    /// List installed engines and their sites
    Engines,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
