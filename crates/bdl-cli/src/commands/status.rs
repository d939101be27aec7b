//! Status command implementation

use std::path::PathBuf;

use bdl_core::{ItemStatus, RemoteStatus, Repository, RepositoryStatus};
use colored::Colorize;
use serde_json::json;

use super::finish;
use crate::context::Context;
use crate::error::Result;

/// Run the status command
///
/// With `remote`, also lists the remote to report reachability and how many
/// remote items are not indexed yet.
pub async fn run_status(
    context: &Context,
    targets: &[PathBuf],
    remote: bool,
    json: bool,
) -> Result<()> {
    let mut failed = 0;
    let mut documents = Vec::new();
    for target in targets {
        let repository = match context
            .repository_root(target)
            .and_then(|root| Ok(Repository::open(root)?))
        {
            Ok(repository) => repository,
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                failed += 1;
                continue;
            }
        };
        let status = repository.status();
        let remote_status = if remote {
            Some(repository.remote_status(&context.registry).await)
        } else {
            None
        };
        if remote_status.as_ref().is_some_and(|r| !r.reachable) {
            failed += 1;
        }

        if json {
            documents.push(to_json(&status, remote_status.as_ref()));
        } else {
            print_status(&status, remote_status.as_ref());
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
    }
    finish(failed, targets.len())
}

fn to_json(status: &RepositoryStatus, remote: Option<&RemoteStatus>) -> serde_json::Value {
    let mut document = json!({
        "name": status.name,
        "url": status.url,
        "engine": status.engine,
        "template": status.template,
        "counts": status.counts,
        "total": status.counts.total(),
    });
    if let Some(remote) = remote {
        document["remote"] = json!({
            "reachable": remote.reachable,
            "error": remote.error,
            "listed": remote.listed,
            "unindexed": remote.unindexed,
        });
    }
    document
}

fn print_status(status: &RepositoryStatus, remote: Option<&RemoteStatus>) {
    println!("{}", status.name.cyan().bold());
    println!("   {}:      {}", "URL".dimmed(), status.url);
    println!("   {}:   {}", "Engine".dimmed(), status.engine);
    println!("   {}: {}", "Template".dimmed(), status.template);
    for state in ItemStatus::ALL {
        let count = status.counts.get(state);
        let label = format!("{:>8}", state.as_str());
        let label = match state {
            ItemStatus::Current => label.green(),
            ItemStatus::New => label.blue(),
            ItemStatus::Missing => label.yellow(),
            ItemStatus::Deleted => label.red(),
        };
        println!("   {} {}", label, count);
    }
    println!("   {:>8} {}", "total".bold(), status.counts.total());

    if let Some(remote) = remote {
        if remote.reachable {
            println!(
                "   {} remote reachable, {} listed, {} not indexed",
                "OK".green().bold(),
                remote.listed,
                remote.unindexed
            );
        } else {
            println!(
                "   {} remote unreachable: {}",
                "!!".red().bold(),
                remote.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdl_core::StatusCounts;

    fn sample() -> RepositoryStatus {
        RepositoryStatus {
            name: "gallery".into(),
            url: "file:///srv/gallery".into(),
            engine: "local".into(),
            template: "{position}.{extension}".into(),
            counts: StatusCounts {
                new: 1,
                current: 2,
                deleted: 0,
                missing: 1,
            },
        }
    }

    #[test]
    fn test_json_without_remote() {
        let value = to_json(&sample(), None);
        assert_eq!(value["name"], "gallery");
        assert_eq!(value["counts"]["current"], 2);
        assert_eq!(value["total"], 4);
        assert!(value.get("remote").is_none());
    }

    #[test]
    fn test_json_with_remote() {
        let remote = RemoteStatus {
            reachable: false,
            error: Some("down".into()),
            listed: 0,
            unindexed: 0,
        };
        let value = to_json(&sample(), Some(&remote));
        assert_eq!(value["remote"]["reachable"], false);
        assert_eq!(value["remote"]["error"], "down");
    }
}
