//! Rename command implementation

use std::path::PathBuf;

use bdl_core::Repository;
use colored::Colorize;

use super::for_each_target;
use crate::context::Context;
use crate::error::Result;

/// Run the rename command
///
/// Applies `template` (or the default) to every downloaded file.
pub fn run_rename(context: &Context, targets: &[PathBuf], template: Option<&str>) -> Result<()> {
    for_each_target(targets, |target| {
        let root = context.repository_root(target)?;
        let mut repository = Repository::open(root)?;
        let report = repository.rename(template)?;

        println!(
            "{} {} now uses {}",
            "OK".green().bold(),
            repository.name().cyan(),
            repository.template().yellow()
        );
        println!(
            "   renamed {}, unchanged {}",
            report.renamed, report.unchanged
        );
        if !report.missing.is_empty() {
            let positions: Vec<String> = report.missing.iter().map(u64::to_string).collect();
            println!(
                "   {} files not on disk: #{}",
                "!".yellow(),
                positions.join(", #")
            );
            println!(
                "   Run {} to restore them.",
                format!("bdl reset {}", target.display()).cyan()
            );
        }
        Ok(true)
    })
}
