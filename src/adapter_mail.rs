//! Mail adapter.
//!
//! Mail has no API token. "Authenticating" means proving that the local
//! mail automation answers at all, which on macOS may first require the
//! user to grant automation permission. The probe is retried a fixed
//! number of times with a fixed delay so a permission prompt has a chance
//! to be answered.
//!
//! Access to the mail client goes through [`MailBackend`]. The default
//! backend drives Mail.app with AppleScript via `osascript`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MailConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::models::{NormalizedRecord, RecordKind, SourceType};
use crate::osascript;
use crate::traits::{Adapter, AdapterCore, AdapterState, AuthState};

pub const SLOT: &str = "mail_enabled";

/// One message as listed by a [`MailBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub received: DateTime<Utc>,
    pub content: String,
}

/// The local mail client.
#[async_trait]
pub trait MailBackend: Send + Sync {
    /// Cheap call that succeeds only if the client can be automated.
    async fn probe(&self) -> Result<(), AuthError>;

    /// Inbox messages received in the look-back window.
    async fn recent_messages(&self) -> Result<Vec<MailMessage>, FetchError>;
}

// ═══════════════════════════════════════════════════════════════════════
// AppleScript backend
// ═══════════════════════════════════════════════════════════════════════

pub struct AppleScriptMail {
    lookback_days: i64,
}

impl AppleScriptMail {
    pub fn new(lookback_days: i64) -> Self {
        Self { lookback_days }
    }

    fn listing_script(&self) -> String {
        format!(
            r#"{separators}set nowDate to current date
set cutoff to nowDate - ({days} * days)
set output to ""
tell application "Mail"
    repeat with anAccount in accounts
        try
            set recent to (messages of mailbox "INBOX" of anAccount whose date received > cutoff)
            repeat with aMessage in recent
                try
                    set age to (nowDate - (date received of aMessage)) as integer
                    set output to output & (message id of aMessage) & fs & (subject of aMessage) & fs & (sender of aMessage) & fs & age & fs & (content of aMessage) & rs
                end try
            end repeat
        end try
    end repeat
end tell
return output"#,
            separators = osascript::SEPARATORS,
            days = self.lookback_days
        )
    }
}

#[async_trait]
impl MailBackend for AppleScriptMail {
    async fn probe(&self) -> Result<(), AuthError> {
        osascript::run(r#"tell application "Mail" to get name"#)
            .await
            .map(|_| ())
            .map_err(|e| AuthError::Unavailable(e.into_message()))
    }

    async fn recent_messages(&self) -> Result<Vec<MailMessage>, FetchError> {
        let output = osascript::run(&self.listing_script())
            .await
            .map_err(|e| FetchError::Service(e.into_message()))?;
        let (messages, bad) = parse_listing(&output, Utc::now());
        if bad > 0 {
            tracing::warn!(records = bad, "skipping unreadable mail records");
        }
        Ok(messages)
    }
}

/// Parse the script output: records separated by ASCII 30, fields by
/// ASCII 31 in the order id, subject, sender, age in seconds, content.
///
/// Returns the parsed messages and the number of records skipped.
pub fn parse_listing(output: &str, now: DateTime<Utc>) -> (Vec<MailMessage>, usize) {
    let (records, mut bad) = osascript::split_records(output, 5);
    let mut messages = Vec::new();
    for fields in records {
        let [id, subject, sender, age, content] = fields[..] else {
            bad += 1;
            continue;
        };
        match age.trim().parse::<i64>() {
            Ok(age) => messages.push(MailMessage {
                id: id.trim().to_string(),
                subject: subject.to_string(),
                sender: sender.to_string(),
                received: now - chrono::Duration::seconds(age),
                content: content.trim().to_string(),
            }),
            Err(_) => bad += 1,
        }
    }
    (messages, bad)
}

// ═══════════════════════════════════════════════════════════════════════
// Adapter
// ═══════════════════════════════════════════════════════════════════════

pub struct MailAdapter {
    config: MailConfig,
    backend: Arc<dyn MailBackend>,
    core: AdapterCore<()>,
}

impl MailAdapter {
    pub fn new(
        config: MailConfig,
        backend: Arc<dyn MailBackend>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            backend,
            core: AdapterCore::new(SLOT, credentials),
        }
    }

    async fn probe_with_retries(&self) -> Result<(), AuthError> {
        osascript::probe_with_retries(
            "mail",
            self.config.probe_attempts,
            self.config.probe_delay_ms,
            || self.backend.probe(),
        )
        .await
    }
}

fn to_record(message: MailMessage) -> NormalizedRecord {
    let url = format!("message://{}", message.id);
    NormalizedRecord::new(RecordKind::Email, message.id, message.received)
        .with_title(message.subject)
        .with_body(message.content)
        .with_url(url)
        .with_field("sender", message.sender)
}

#[async_trait]
impl Adapter for MailAdapter {
    fn name(&self) -> &str {
        "mail"
    }

    fn description(&self) -> &str {
        "Recent Mail.app inbox messages addressed to you or asking for action"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Mail
    }

    fn credential_slot(&self) -> &str {
        self.core.slot()
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Email
    }

    fn needs_credential(&self) -> bool {
        false
    }

    /// The credential is ignored; only the enabled marker is stored.
    async fn authenticate(&self, _credential: &str) -> Result<AuthState, AuthError> {
        self.core.connecting("Connecting to Mail...").await;
        match self.probe_with_retries().await {
            Ok(()) => {
                self.core.establish((), "true", "Connected to Mail").await?;
                tracing::info!("mail connected");
                Ok(AuthState::default())
            }
            Err(e) => {
                self.core.auth_failed(&e).await;
                Err(e)
            }
        }
    }

    async fn restore(&self) -> Result<Option<AuthState>, AuthError> {
        match self.core.stored_credential()? {
            Some(marker) => self.authenticate(&marker).await.map(Some),
            None => Ok(None),
        }
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.core.clear().await
    }

    async fn fetch(&self) -> Result<Vec<NormalizedRecord>, FetchError> {
        self.core.session().await.ok_or(FetchError::NotAuthenticated)?;
        self.core.set_status("Syncing emails...").await;

        match self.backend.recent_messages().await {
            Ok(messages) => {
                let records: Vec<NormalizedRecord> = messages.into_iter().map(to_record).collect();
                self.core.fetch_succeeded(records.len(), 0).await;
                Ok(records)
            }
            Err(e) => {
                self.core.fetch_failed(&e).await;
                Err(e)
            }
        }
    }

    async fn state(&self) -> AdapterState {
        self.core.state().await
    }
}
