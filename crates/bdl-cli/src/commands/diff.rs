//! Diff command implementation

use std::path::PathBuf;

use bdl_core::Repository;
use colored::Colorize;

use super::for_each_target;
use crate::context::Context;
use crate::error::Result;

/// Run the diff command
///
/// Lists items the remote no longer lists and downloaded files that are gone.
pub fn run_diff(context: &Context, targets: &[PathBuf]) -> Result<()> {
    for_each_target(targets, |target| {
        let root = context.repository_root(target)?;
        let repository = Repository::open(root)?;
        let diff = repository.diff();

        println!("{}", repository.name().cyan().bold());
        if diff.deleted.is_empty() && diff.missing_files.is_empty() {
            println!("   {} nothing changed", "OK".green().bold());
            return Ok(true);
        }
        for item in &diff.deleted {
            println!(
                "   {} #{} {} {}",
                "-".red(),
                item.position,
                item.remote_id,
                "(no longer listed)".dimmed()
            );
        }
        for item in &diff.missing_files {
            println!(
                "   {} #{} {} {}",
                "?".yellow(),
                item.position,
                item.local_filename.as_deref().unwrap_or_default(),
                "(file missing)".dimmed()
            );
        }
        Ok(true)
    })
}
