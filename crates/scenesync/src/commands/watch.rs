//! Watch command: stream change notifications until interrupted.

use std::time::Duration;

use chrono::Local;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use scenesync_core::{ChangeSet, ConnectionStatus, StatusReport};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::Remote;

/// High-rate updates hidden unless `--all` is given.
const NOISY: ChangeSet = ChangeSet::STATS.union(ChangeSet::MEDIA).union(ChangeSet::METERS);

fn describe(changes: ChangeSet) -> String {
    changes
        .iter_names()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_line(report: &StatusReport) -> String {
    match report.message {
        Some(ref message) => format!("{}: {message}", report.status),
        None => report.status.to_string(),
    }
}

pub async fn handle(remote: &Remote, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let engine = &remote.engine;
    let color = output::should_color(&global.color);
    let mut changes = engine.changes();
    let mut status = engine.subscribe_status();

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    if !global.quiet {
        eprintln!(
            "Watching {} (profile '{}'). Press Ctrl-C to stop.",
            remote.address, remote.profile
        );
    }

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,

            received = changes.recv() => match received {
                Ok(set) => {
                    let set = if args.all { set } else { set.difference(NOISY) };
                    if set.is_empty() || global.quiet {
                        continue;
                    }
                    let stamp = Local::now().format("%H:%M:%S%.3f").to_string();
                    let what = describe(set);
                    if color {
                        println!("{} {}", stamp.dimmed(), what.cyan());
                    } else {
                        println!("{stamp} {what}");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "change notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = status.borrow_and_update().clone();
                if global.quiet {
                    continue;
                }
                let stamp = Local::now().format("%H:%M:%S%.3f").to_string();
                let line = status_line(&report);
                if !color {
                    eprintln!("{stamp} status {line}");
                } else if report.status == ConnectionStatus::Ok {
                    eprintln!("{} status {}", stamp.dimmed(), line.green());
                } else {
                    eprintln!("{} status {}", stamp.dimmed(), line.yellow());
                }
            }
        }
    }

    Ok(())
}
