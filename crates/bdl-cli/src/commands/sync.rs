//! Update, stash, reset and checkout command implementations
//!
//! All four run the same synchronization and differ only in which items
//! they download.

use std::path::PathBuf;

use bdl_core::{Repository, SyncMode, SyncReport};
use colored::Colorize;

use super::finish;
use crate::context::Context;
use crate::error::Result;
use crate::progress::Progress;

/// Sync one repository while printing a running counter.
pub(crate) async fn sync_with_progress(
    context: &Context,
    repository: &mut Repository,
    mode: SyncMode,
) -> Result<SyncReport> {
    let progress = Progress::start(repository.name().to_string());
    let mut options = context.sync_options();
    options.events = Some(progress.sender());

    let result = repository.sync(&context.registry, mode, &options).await;
    // Drop our sender so the printer can drain and stop
    drop(options);
    progress.finish().await;
    Ok(result?)
}

/// Print a sync report.
pub(crate) fn print_report(report: &SyncReport) {
    let headline = if report.is_success() {
        "OK".green().bold()
    } else {
        "FAILED".red().bold()
    };
    println!(
        "{} {} ({})",
        headline,
        report.repository.cyan(),
        report.mode
    );
    println!(
        "   listed {}, new {}, no longer listed {}",
        report.discovered, report.added, report.delisted
    );
    println!(
        "   downloaded {}, failed {}, unchanged {}",
        report.downloaded, report.failed, report.unchanged
    );
    if report.cancelled > 0 {
        println!(
            "   {} {} not started (cancelled)",
            "!".yellow(),
            report.cancelled
        );
    }
    for failure in &report.failures {
        println!(
            "   {} #{} {}: {}",
            "-".red(),
            failure.position,
            failure.remote_id,
            failure.cause
        );
    }
}

/// Run a sync command over every target repository.
pub async fn run_sync(context: &Context, mode: SyncMode, targets: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for target in targets {
        if context.cancel.is_cancelled() {
            eprintln!(
                "{} skipping {} (cancelled)",
                "!".yellow(),
                target.display()
            );
            failed += 1;
            continue;
        }
        match sync_target(context, mode, target).await {
            Ok(report) => {
                print_report(&report);
                if !report.is_success() {
                    failed += 1;
                }
            }
            Err(e) => {
                eprintln!("{}: {}: {}", "error".red().bold(), target.display(), e);
                failed += 1;
            }
        }
    }
    finish(failed, targets.len())
}

async fn sync_target(
    context: &Context,
    mode: SyncMode,
    target: &std::path::Path,
) -> Result<SyncReport> {
    let root = context.repository_root(target)?;
    let mut repository = Repository::open(root)?;
    sync_with_progress(context, &mut repository, mode).await
}
