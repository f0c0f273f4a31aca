//! Slack adapter.
//!
//! Authenticates a bot/user token with `auth.test`, lists the non-archived
//! public and private channels the token can see, and reads the most recent
//! messages of each. Every message becomes one [`RecordKind::Message`]
//! record titled `#channel`.
//!
//! Slack answers most errors with HTTP 200 and `{"ok": false, "error": …}`;
//! those bodies are mapped onto the same error taxonomy as HTTP failures.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::SlackConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::http::{auth_get, endpoint, fetch_get};
use crate::models::{NormalizedRecord, RecordKind, SourceType};
use crate::profile::UserProfile;
use crate::traits::{Adapter, AdapterCore, AdapterState, AuthState};

pub const SLOT: &str = "slack_token";

#[derive(Debug, Clone)]
struct SlackSession {
    token: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Clone, Deserialize)]
struct Channel {
    id: String,
    name: String,
    #[serde(default)]
    is_archived: bool,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    ts: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<String>,
}

pub struct SlackAdapter {
    config: SlackConfig,
    client: Client,
    core: AdapterCore<SlackSession>,
}

impl SlackAdapter {
    pub fn new(config: SlackConfig, client: Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            client,
            core: AdapterCore::new(SLOT, credentials),
        }
    }

    async fn channels(&self, token: &str) -> Result<Vec<Channel>, FetchError> {
        let url = endpoint(
            &self.config.base_url,
            "conversations.list?types=public_channel,private_channel",
        );
        let response: ChannelsResponse = fetch_get(&self.client, &url, token).await?;
        if !response.ok {
            return Err(api_error(response.error));
        }
        Ok(response
            .channels
            .into_iter()
            .filter(|c| !c.is_archived)
            .collect())
    }

    async fn history(&self, token: &str, channel: &Channel) -> Result<Vec<NormalizedRecord>, FetchError> {
        let url = endpoint(
            &self.config.base_url,
            &format!(
                "conversations.history?channel={}&limit={}",
                channel.id, self.config.history_limit
            ),
        );
        let response: HistoryResponse = fetch_get(&self.client, &url, token).await?;
        if !response.ok {
            return Err(api_error(response.error));
        }
        Ok(response
            .messages
            .into_iter()
            .map(|m| to_record(channel, m))
            .collect())
    }
}

fn to_record(channel: &Channel, message: Message) -> NormalizedRecord {
    let url = format!("slack://channel?id={}&message={}", channel.id, message.ts);
    let mut record = NormalizedRecord::new(
        RecordKind::Message,
        format!("{}:{}", channel.id, message.ts),
        parse_ts(&message.ts),
    )
    .with_title(format!("#{}", channel.name))
    .with_body(message.text)
    .with_url(url)
    .with_field("channel", channel.name.clone())
    .with_field("channel_id", channel.id.clone());
    if let Some(user) = message.user {
        record = record.with_field("user", user);
    }
    record
}

/// Slack `ts` values are `"<seconds>.<micros>"`. Unparseable values map to
/// the epoch.
fn parse_ts(ts: &str) -> DateTime<Utc> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().unwrap_or(0);
    let micros: u32 = format!("{:0<6}", frac)
        .get(..6)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    DateTime::from_timestamp(secs, micros * 1_000).unwrap_or_default()
}

fn api_error(code: Option<String>) -> FetchError {
    match code.as_deref() {
        Some("ratelimited") => FetchError::RateLimited,
        Some("not_authed") | Some("invalid_auth") | Some("token_revoked") => {
            FetchError::NotAuthenticated
        }
        Some(other) => FetchError::Service(other.to_string()),
        None => FetchError::Service("unknown error".to_string()),
    }
}

#[async_trait]
impl Adapter for SlackAdapter {
    fn name(&self) -> &str {
        "slack"
    }

    fn description(&self) -> &str {
        "Slack channel messages that mention you or ask for action"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Slack
    }

    fn credential_slot(&self) -> &str {
        self.core.slot()
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Message
    }

    async fn authenticate(&self, credential: &str) -> Result<AuthState, AuthError> {
        let url = endpoint(&self.config.base_url, "auth.test");
        let result = match auth_get::<AuthTestResponse>(&self.client, &url, credential).await {
            Ok(r) if r.ok => Ok(r),
            Ok(r) => Err(match r.error.as_deref() {
                Some("invalid_auth") | Some("not_authed") | Some("token_revoked")
                | Some("account_inactive") => AuthError::InvalidCredential,
                Some(other) => AuthError::Service(other.to_string()),
                None => AuthError::Service("auth.test failed".to_string()),
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(r) => {
                let session = SlackSession {
                    token: credential.to_string(),
                    user_id: r.user_id.clone(),
                };
                let status = match &r.team {
                    Some(team) => format!("Connected to {}", team),
                    None => "Connected".to_string(),
                };
                self.core.establish(session, credential, &status).await?;
                tracing::info!(user = ?r.user, team = ?r.team, "slack authenticated");
                Ok(AuthState {
                    account: r.user,
                    platform_user_id: r.user_id,
                })
            }
            Err(e) => {
                self.core.auth_failed(&e).await;
                Err(e)
            }
        }
    }

    async fn restore(&self) -> Result<Option<AuthState>, AuthError> {
        match self.core.stored_credential()? {
            Some(token) => self.authenticate(&token).await.map(Some),
            None => Ok(None),
        }
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.core.clear().await
    }

    async fn fetch(&self) -> Result<Vec<NormalizedRecord>, FetchError> {
        let session = self.core.session().await.ok_or(FetchError::NotAuthenticated)?;

        let channels = match self.channels(&session.token).await {
            Ok(c) => c,
            Err(e) => {
                self.core.fetch_failed(&e).await;
                return Err(e);
            }
        };

        let mut records = Vec::new();
        let mut skipped = 0;
        for channel in &channels {
            match self.history(&session.token, channel).await {
                Ok(mut batch) => records.append(&mut batch),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(channel = %channel.name, error = %e, "skipping slack channel");
                }
            }
        }

        tracing::debug!(
            channels = channels.len(),
            messages = records.len(),
            "slack fetch done"
        );
        self.core.fetch_succeeded(records.len(), skipped).await;
        Ok(records)
    }

    async fn state(&self) -> AdapterState {
        self.core.state().await
    }

    async fn effective_profile(&self, profile: &UserProfile) -> UserProfile {
        let user_id = self.core.session().await.and_then(|s| s.user_id);
        profile.with_fallback_platform_id(user_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_keeps_microseconds() {
        let t = parse_ts("1700000000.000100");
        assert_eq!(t.timestamp(), 1_700_000_000);
        assert_eq!(t.timestamp_subsec_micros(), 100);
        assert_eq!(parse_ts("garbage").timestamp(), 0);
    }

    #[test]
    fn error_codes() {
        assert_eq!(api_error(Some("ratelimited".into())), FetchError::RateLimited);
        assert_eq!(api_error(Some("invalid_auth".into())), FetchError::NotAuthenticated);
        assert_eq!(
            api_error(Some("channel_not_found".into())),
            FetchError::Service("channel_not_found".into())
        );
    }

    #[test]
    fn record_shape() {
        let channel = Channel {
            id: "C01".into(),
            name: "eng".into(),
            is_archived: false,
        };
        let r = to_record(
            &channel,
            Message {
                ts: "1700000000.000100".into(),
                text: "todo: ship it".into(),
                user: Some("U1".into()),
            },
        );
        assert_eq!(r.id, "C01:1700000000.000100");
        assert_eq!(r.title, "#eng");
        assert_eq!(r.url, "slack://channel?id=C01&message=1700000000.000100");
        assert_eq!(r.field("user"), Some("U1"));
    }
}
