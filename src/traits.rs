//! The adapter contract and the registry that holds one adapter per service.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             AdapterRegistry              │
//! │  ┌──────┐ ┌───────┐ ┌────────┐ ┌──────┐  │
//! │  │ Quip │ │ Slack │ │ Chorus │ │ Mail │  │
//! │  └──────┘ └───────┘ └────────┘ └──────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!     SyncHub::sync_all() → classify → merge
//! ```
//!
//! Adapters own their session and status. Everything they share with the
//! rest of the process (credentials, config) is injected at construction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::classify::SourceRules;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::models::{NormalizedRecord, RecordKind, SourceType};
use crate::profile::UserProfile;

/// Public status of one adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdapterState {
    pub authenticated: bool,
    /// Human-readable status line (`"Connected"`, `"Sync complete"`, …).
    pub status: String,
    pub last_error: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// What a successful authentication learned about the account.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    /// Account label reported by the service, if any.
    pub account: Option<String>,
    /// Chat platform user id reported by the service, if any.
    pub platform_user_id: Option<String>,
}

/// A source of candidate work items.
///
/// # Lifecycle
///
/// 1. [`restore`](Adapter::restore) at startup re-validates a stored
///    credential, or [`authenticate`](Adapter::authenticate) is called with
///    a fresh one.
/// 2. [`fetch`](Adapter::fetch) is called on every sync.
/// 3. [`logout`](Adapter::logout) forgets the session and the credential.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short identifier (`"slack"`), used on the command line.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Credential store slot for this adapter.
    fn credential_slot(&self) -> &str;

    /// Kind of the records this adapter primarily produces.
    fn record_kind(&self) -> RecordKind;

    /// False for local applications, which authenticate by probing and
    /// ignore the credential argument.
    fn needs_credential(&self) -> bool {
        true
    }

    /// Identity check used to upgrade priority.
    fn is_mentioned(&self, text: &str, profile: &UserProfile) -> bool {
        SourceRules::for_kind(self.record_kind())
            .mention
            .matches(text, profile)
    }

    /// Validate `credential` against the live service and keep it on success.
    ///
    /// On failure the previous session (if any) stays in place.
    async fn authenticate(&self, credential: &str) -> Result<AuthState, AuthError>;

    /// Re-validate the stored credential. `Ok(None)` when nothing is stored.
    async fn restore(&self) -> Result<Option<AuthState>, AuthError>;

    /// Drop the session and the stored credential.
    async fn logout(&self) -> anyhow::Result<()>;

    /// Fetch and normalize the current items.
    ///
    /// Partial failures (one channel, one document) are skipped; only a
    /// failure of the primary listing fails the call.
    async fn fetch(&self) -> Result<Vec<NormalizedRecord>, FetchError>;

    async fn state(&self) -> AdapterState;

    /// The profile to classify this adapter's records with.
    ///
    /// Adapters that learn the user's platform id during authentication
    /// fill it in here when the configured profile leaves it blank.
    async fn effective_profile(&self, profile: &UserProfile) -> UserProfile {
        profile.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Shared session bookkeeping
// ═══════════════════════════════════════════════════════════════════════

/// Session and status storage shared by the built-in adapters.
pub struct AdapterCore<S> {
    slot: &'static str,
    credentials: Arc<dyn CredentialStore>,
    session: RwLock<Option<S>>,
    state: RwLock<AdapterState>,
}

impl<S: Clone + Send + Sync> AdapterCore<S> {
    pub fn new(slot: &'static str, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            slot,
            credentials,
            session: RwLock::new(None),
            state: RwLock::new(AdapterState {
                status: "Not connected".to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn slot(&self) -> &'static str {
        self.slot
    }

    pub fn stored_credential(&self) -> Result<Option<String>, AuthError> {
        self.credentials
            .get(self.slot)
            .map_err(|e| AuthError::Service(format!("credential store: {}", e)))
    }

    pub async fn session(&self) -> Option<S> {
        self.session.read().await.clone()
    }

    /// Persist the credential behind a validated session, then install it.
    ///
    /// A credential that cannot be stored fails the authentication, since
    /// the next `restore` would not find it.
    pub async fn establish(
        &self,
        session: S,
        credential: &str,
        status: &str,
    ) -> Result<(), AuthError> {
        if let Err(e) = self.credentials.set(self.slot, credential) {
            tracing::warn!(slot = self.slot, error = %e, "failed to persist credential");
            let err = AuthError::Service(format!("credential store: {}", e));
            self.auth_failed(&err).await;
            return Err(err);
        }
        *self.session.write().await = Some(session);
        let mut state = self.state.write().await;
        state.authenticated = true;
        state.status = status.to_string();
        state.last_error = None;
        Ok(())
    }

    /// Record a failed authentication without touching the current session.
    pub async fn auth_failed(&self, err: &AuthError) {
        let mut state = self.state.write().await;
        state.last_error = Some(err.to_string());
        if !state.authenticated {
            state.status = format!("Authentication failed: {}", err);
        }
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        *self.session.write().await = None;
        *self.state.write().await = AdapterState {
            status: "Not connected".to_string(),
            ..Default::default()
        };
        self.credentials.remove(self.slot)
    }

    pub async fn fetch_succeeded(&self, count: usize, skipped: usize) {
        let mut state = self.state.write().await;
        state.last_sync = Some(Utc::now());
        state.status = if skipped == 0 {
            format!("Sync complete ({} items)", count)
        } else {
            format!("Sync complete ({} items, {} skipped)", count, skipped)
        };
        state.last_error = None;
    }

    pub async fn fetch_failed(&self, err: &FetchError) {
        let mut state = self.state.write().await;
        state.status = "Sync failed".to_string();
        state.last_error = Some(err.to_string());
    }

    /// Show a transient status while (re)connecting. A live session keeps
    /// its status so a failed re-authentication leaves it untouched.
    pub async fn connecting(&self, status: &str) {
        let mut state = self.state.write().await;
        if !state.authenticated {
            state.status = status.to_string();
        }
    }

    pub async fn set_status(&self, status: &str) {
        self.state.write().await.status = status.to_string();
    }

    pub async fn state(&self) -> AdapterState {
        self.state.read().await.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Ordered collection of adapters. Order is the merge order on sync.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in adapters, in the order
    /// Quip, Slack, Chorus, Mail, Calendar.
    pub fn from_config(
        config: &Config,
        credentials: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<Self> {
        use crate::adapter_calendar::{AppleScriptCalendar, CalendarAdapter};
        use crate::adapter_chorus::ChorusAdapter;
        use crate::adapter_mail::{AppleScriptMail, MailAdapter};
        use crate::adapter_quip::QuipAdapter;
        use crate::adapter_slack::SlackAdapter;
        use crate::http::build_client;

        let client = build_client(&config.sync)?;
        let mut registry = Self::new();
        registry.register(Arc::new(QuipAdapter::new(
            config.adapters.quip.clone(),
            client.clone(),
            credentials.clone(),
        )));
        registry.register(Arc::new(SlackAdapter::new(
            config.adapters.slack.clone(),
            client.clone(),
            credentials.clone(),
        )));
        registry.register(Arc::new(ChorusAdapter::new(
            config.adapters.chorus.clone(),
            config.sync.enrichment_concurrency,
            client,
            credentials.clone(),
        )));
        registry.register(Arc::new(MailAdapter::new(
            config.adapters.mail.clone(),
            Arc::new(AppleScriptMail::new(config.adapters.mail.lookback_days)),
            credentials.clone(),
        )));
        registry.register(Arc::new(CalendarAdapter::new(
            config.adapters.calendar.clone(),
            Arc::new(AppleScriptCalendar::new(config.adapters.calendar.lookahead_days)),
            credentials,
        )));
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Adapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    /// Resolve `"all"` or a single adapter name.
    pub fn select(&self, selector: &str) -> anyhow::Result<Vec<Arc<dyn Adapter>>> {
        if selector == "all" {
            return Ok(self.adapters.clone());
        }
        match self.get(selector) {
            Some(a) => Ok(vec![a.clone()]),
            None => {
                let names: Vec<&str> = self.adapters.iter().map(|a| a.name()).collect();
                anyhow::bail!(
                    "Unknown adapter: '{}'. Available: all, {}",
                    selector,
                    names.join(", ")
                )
            }
        }
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
