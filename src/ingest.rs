//! Sync and import commands.
//!
//! `td sync` pulls from the connected adapters and prints the review list.
//! `td import` runs the same sync and materializes the chosen candidates
//! into the todo store. Import is idempotent per candidate id.

use std::future::Future;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::aggregate::group_by_source;
use crate::config::Config;
use crate::materialize::commit_to_store;
use crate::models::IntegratedItem;
use crate::store::{SqliteTodoStore, TodoStore};
use crate::sync::{Outcome, SyncHub, SyncReport};

/// Completes when `signal` fires. If the handler could not be installed the
/// sync runs to completion instead of being reported as cancelled.
async fn interrupted<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; sync is not cancellable");
        std::future::pending::<()>().await;
    }
}

async fn collect(config: &Config, adapter: &str) -> Result<SyncReport> {
    let hub = SyncHub::from_config(config)?.select(adapter)?;
    hub.restore_all().await;
    if !hub.any_configured().await {
        bail!("No integration is connected. Run `td auth <adapter>` first.");
    }

    let report = hub
        .sync_all_until(interrupted(tokio::signal::ctrl_c()))
        .await?;

    for outcome in &report.outcomes {
        match &outcome.outcome {
            Outcome::NotConnected => {}
            Outcome::Fetched {
                records,
                candidates,
            } => println!(
                "{:<8} {} records, {} candidates",
                outcome.adapter, records, candidates
            ),
            Outcome::Failed(e) => println!("{:<8} failed: {}", outcome.adapter, e),
        }
    }
    Ok(report)
}

fn print_review(items: &[IntegratedItem]) {
    let now = Utc::now();
    for (source, members) in group_by_source(items) {
        println!();
        println!("{} ({})", source, members.len());
        for item in members {
            let due = item
                .due_date
                .map(|d| {
                    let days = (d - now).num_days();
                    format!("{} (in {}d)", d.format("%Y-%m-%d"), days)
                })
                .unwrap_or_else(|| "-".to_string());
            println!("  [{:?}] {}", item.priority, item.title);
            println!("      id:  {}", item.id);
            println!("      due: {}", due);
            println!("      url: {}", item.url);
        }
    }
}

pub async fn run_sync(config: &Config, adapter: &str, json: bool) -> Result<()> {
    let report = collect(config, adapter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.items)?);
    } else if report.items.is_empty() {
        println!("No actionable items.");
    } else {
        print_review(&report.items);
    }
    Ok(())
}

/// Import the candidates whose ids are in `ids`, or all of them.
pub async fn run_import(config: &Config, adapter: &str, ids: &[String], all: bool) -> Result<()> {
    if ids.is_empty() && !all {
        bail!("Pass candidate ids to import, or --all");
    }
    let report = collect(config, adapter).await?;

    let chosen: Vec<&IntegratedItem> = report
        .items
        .iter()
        .filter(|i| all || ids.contains(&i.id))
        .collect();
    for id in ids {
        if !report.items.iter().any(|i| &i.id == id) {
            tracing::warn!(id = %id, "candidate not found in this sync");
        }
    }

    let store = SqliteTodoStore::open(config).await?;
    let (mut created, mut updated) = (0u64, 0u64);
    for item in chosen {
        let committed = commit_to_store(&store as &dyn TodoStore, item).await?;
        if committed.is_created() {
            created += 1;
        } else {
            updated += 1;
        }
    }
    store.close().await;

    println!("import");
    println!("  created: {}", created);
    println!("  updated: {}", updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_fires_interrupt() {
        let done = tokio::time::timeout(Duration::from_secs(1), interrupted(async { Ok(()) })).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn broken_signal_handler_never_interrupts() {
        let broken = async { Err(std::io::Error::other("no signal handler")) };
        let done = tokio::time::timeout(Duration::from_millis(50), interrupted(broken)).await;
        assert!(done.is_err());
    }
}
