//! Fan-out sync across all connected adapters.
//!
//! ```text
//! SyncHub::sync_all()
//!   ├── fetch()  quip ────┐
//!   ├── fetch()  slack    │
//!   ├── fetch()  chorus   ├─ join_all ─→ classify (per adapter profile) ─→ merge
//!   ├── fetch()  mail     │
//!   └── fetch()  calendar ┘
//! ```
//!
//! Adapter failures stop at the adapter: they are recorded on the adapter's
//! state and in the [`SyncReport`], and the remaining adapters still
//! contribute their items.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::aggregate::merge;
use crate::classify::classify_all;
use crate::config::Config;
use crate::credentials::FileCredentialStore;
use crate::error::{AuthError, FetchError, SyncError};
use crate::models::IntegratedItem;
use crate::profile::UserProfile;
use crate::traits::{AdapterRegistry, AuthState};

/// What happened to one adapter during a sync.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The adapter has no live session and was not asked to fetch.
    NotConnected,
    Fetched { records: usize, candidates: usize },
    Failed(FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutcome {
    pub adapter: String,
    pub outcome: Outcome,
}

/// Result of one sync: the merged review list and per-adapter outcomes in
/// registration order.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub items: Vec<IntegratedItem>,
    pub outcomes: Vec<AdapterOutcome>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &AdapterOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
    }
}

pub struct SyncHub {
    registry: AdapterRegistry,
    profile: UserProfile,
}

impl SyncHub {
    pub fn new(registry: AdapterRegistry, profile: UserProfile) -> Self {
        Self { registry, profile }
    }

    /// Hub over the built-in adapters, with credentials from the
    /// configured credential file.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let credentials = Arc::new(FileCredentialStore::open(&config.credentials.path)?);
        let registry = AdapterRegistry::from_config(config, credentials)?;
        Ok(Self::new(registry, config.profile.clone()))
    }

    /// Hub over a subset of `self`'s adapters (`"all"` or one name).
    pub fn select(&self, selector: &str) -> anyhow::Result<SyncHub> {
        let mut registry = AdapterRegistry::new();
        for adapter in self.registry.select(selector)? {
            registry.register(adapter);
        }
        Ok(Self::new(registry, self.profile.clone()))
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: UserProfile) {
        self.profile = profile;
    }

    /// Re-validate every stored credential. Adapters without one stay
    /// disconnected.
    pub async fn restore_all(&self) -> Vec<(String, Result<Option<AuthState>, AuthError>)> {
        let restores = self.registry.adapters().iter().map(|adapter| async move {
            let result = adapter.restore().await;
            if let Err(e) = &result {
                tracing::warn!(adapter = adapter.name(), error = %e, "stored credential rejected");
            }
            (adapter.name().to_string(), result)
        });
        join_all(restores).await
    }

    /// True when at least one adapter has a live session.
    pub async fn any_configured(&self) -> bool {
        for adapter in self.registry.adapters() {
            if adapter.state().await.authenticated {
                return true;
            }
        }
        false
    }

    pub async fn sync_all(&self) -> SyncReport {
        self.sync_at(Utc::now()).await
    }

    /// Like [`sync_all`](Self::sync_all), but gives up as soon as `cancel`
    /// completes. In-flight requests are dropped.
    pub async fn sync_all_until<F>(&self, cancel: F) -> Result<SyncReport, SyncError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            report = self.sync_all() => Ok(report),
            _ = cancel => {
                tracing::info!("sync cancelled");
                Err(SyncError::Cancelled)
            }
        }
    }

    /// Sync with an explicit classification time.
    pub async fn sync_at(&self, now: DateTime<Utc>) -> SyncReport {
        let fetches = self.registry.adapters().iter().map(|adapter| async move {
            if !adapter.state().await.authenticated {
                return None;
            }
            Some(adapter.fetch().await)
        });
        let results = join_all(fetches).await;

        let mut lists = Vec::new();
        let mut outcomes = Vec::new();
        for (adapter, result) in self.registry.adapters().iter().zip(results) {
            let outcome = match result {
                None => Outcome::NotConnected,
                Some(Ok(records)) => {
                    let profile = adapter.effective_profile(&self.profile).await;
                    let items = classify_all(&records, &profile, now);
                    let outcome = Outcome::Fetched {
                        records: records.len(),
                        candidates: items.len(),
                    };
                    lists.push(items);
                    outcome
                }
                Some(Err(e)) => {
                    tracing::warn!(adapter = adapter.name(), error = %e, "adapter fetch failed");
                    Outcome::Failed(e)
                }
            };
            outcomes.push(AdapterOutcome {
                adapter: adapter.name().to_string(),
                outcome,
            });
        }

        let items = merge(lists);
        tracing::info!(
            items = items.len(),
            failed = outcomes
                .iter()
                .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
                .count(),
            "sync complete"
        );
        SyncReport { items, outcomes }
    }
}
