//! Connect and clone command implementations

use bdl_core::{ConnectOptions, Repository};
use bdl_fs::NormalizedPath;
use colored::Colorize;

use super::sync::{print_report, sync_with_progress};
use crate::cli::ConnectArgs;
use crate::context::Context;
use crate::error::{CliError, Result};

fn connect_options(args: &ConnectArgs) -> ConnectOptions {
    ConnectOptions {
        name: args.name.clone(),
        template: args.template.clone(),
        engine_config: args.engine_config.iter().cloned().collect(),
    }
}

/// Run the connect command
///
/// Creates the repository directory with its config and an empty index.
pub fn run_connect(context: &Context, args: &ConnectArgs) -> Result<()> {
    let parent = NormalizedPath::new(&context.base);
    let repository = Repository::connect(
        &context.registry,
        &parent,
        &args.url,
        &connect_options(args),
    )?;

    println!(
        "{} Connected {} ({}) at {}",
        "OK".green().bold(),
        repository.name().cyan(),
        repository.config().repo.engine,
        repository.root()
    );
    println!(
        "Run {} to download.",
        format!("bdl checkout {}", repository.name()).cyan()
    );
    Ok(())
}

/// Run the clone command: connect, then check out every item.
pub async fn run_clone(context: &Context, args: &ConnectArgs) -> Result<()> {
    let parent = NormalizedPath::new(&context.base);
    let mut repository = Repository::connect(
        &context.registry,
        &parent,
        &args.url,
        &connect_options(args),
    )?;
    println!(
        "{} Cloning {} into {}",
        "=>".blue().bold(),
        args.url,
        repository.root()
    );

    let report =
        sync_with_progress(context, &mut repository, bdl_core::SyncMode::Checkout).await?;
    print_report(&report);
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::Failed {
            failed: 1,
            total: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_collects_engine_config() {
        let args = ConnectArgs {
            url: "file:///x".into(),
            name: None,
            template: Some("{position}".into()),
            engine_config: vec![
                ("a".into(), "1".into()),
                ("b".into(), "2".into()),
                ("a".into(), "3".into()),
            ],
        };
        let options = connect_options(&args);
        assert_eq!(options.template.as_deref(), Some("{position}"));
        assert_eq!(options.engine_config.len(), 2);
        assert_eq!(options.engine_config["a"], "3");
    }
}
