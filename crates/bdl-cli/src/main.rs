//! bdl CLI
//!
//! The command-line interface for keeping local directories in sync with
//! remote file collections.

mod cli;
mod commands;
mod context;
mod error;
mod progress;

use bdl_core::SyncMode;
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use context::Context;
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let Some(command) = cli.command else {
        // No command provided - show help hint
        println!("{} repository synchronization", "bdl".green().bold());
        println!();
        println!("Run {} for available commands.", "bdl --help".cyan());
        return Ok(());
    };

    let base = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        watch_ctrl_c(cancel.clone());
        let context = Context::new(base, cli.jobs, cancel);
        execute_command(&context, command).await
    })
}

/// Verbose wins over `--log-level`, which wins over `RUST_LOG`.
fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if let Some(level) = cli.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose)
        .try_init();
    if installed.is_ok() {
        tracing::debug!("Logging initialized");
    }
}

/// Cancel running syncs on the first Ctrl-C.
fn watch_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{} interrupted, finishing downloads in progress",
                "!".yellow().bold()
            );
            cancel.cancel();
        }
    });
}

async fn execute_command(context: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Connect(args) => commands::run_connect(context, &args),
        Commands::Clone(args) => commands::run_clone(context, &args).await,
        Commands::Update(targets) => {
            commands::run_sync(context, SyncMode::Update, &targets.repos).await
        }
        Commands::Stash(targets) => {
            commands::run_sync(context, SyncMode::Stash, &targets.repos).await
        }
        Commands::Reset(targets) => {
            commands::run_sync(context, SyncMode::Reset, &targets.repos).await
        }
        Commands::Checkout(targets) => {
            commands::run_sync(context, SyncMode::Checkout, &targets.repos).await
        }
        Commands::Rename { targets, template } => {
            commands::run_rename(context, &targets.repos, template.as_deref())
        }
        Commands::Status {
            targets,
            remote,
            json,
        } => commands::run_status(context, &targets.repos, remote, json).await,
        Commands::Diff(targets) => commands::run_diff(context, &targets.repos),
        Commands::Engines => commands::run_engines(context),
    }
}
