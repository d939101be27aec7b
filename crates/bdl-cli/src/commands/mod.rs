//! Command implementations for bdl-cli

pub mod connect;
pub mod diff;
pub mod engines;
pub mod rename;
pub mod status;
pub mod sync;

pub use connect::{run_clone, run_connect};
pub use diff::run_diff;
pub use engines::run_engines;
pub use rename::run_rename;
pub use status::run_status;
pub use sync::run_sync;

use colored::Colorize;

use crate::error::{CliError, Result};

/// Run `op` for every target, reporting failures without stopping early.
///
/// Returns [`CliError::Failed`] when any target failed.
pub(crate) fn for_each_target<T, F>(targets: &[T], mut op: F) -> Result<()>
where
    F: FnMut(&T) -> Result<bool>,
{
    let mut failed = 0;
    for target in targets {
        match op(target) {
            Ok(true) => {}
            Ok(false) => failed += 1,
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                failed += 1;
            }
        }
    }
    finish(failed, targets.len())
}

pub(crate) fn finish(failed: usize, total: usize) -> Result<()> {
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::Failed { failed, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_each_target_counts_failures() {
        let result = for_each_target(&[1, 2, 3, 4], |n| match n {
            1 => Ok(true),
            2 => Ok(false),
            3 => Err(CliError::user("boom")),
            _ => Ok(true),
        });
        assert!(matches!(
            result,
            Err(CliError::Failed { failed: 2, total: 4 })
        ));
    }

    #[test]
    fn test_for_each_target_success() {
        assert!(for_each_target(&["a"], |_| Ok(true)).is_ok());
    }
}
