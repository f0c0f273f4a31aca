//! Chorus adapter.
//!
//! Lists the meetings recorded in a look-back window, then loads the
//! insights (action items and follow-ups) of each meeting with bounded
//! concurrency. Every action item and follow-up becomes its own record; a
//! meeting whose insights cannot be loaded is kept as a bare
//! [`RecordKind::Meeting`] record.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::Deserialize;

use crate::classify::DECLARED_PRIORITY_FIELD;
use crate::config::ChorusConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::http::{auth_get, endpoint, fetch_get};
use crate::models::{NormalizedRecord, RecordKind, SourceType};
use crate::traits::{Adapter, AdapterCore, AdapterState, AuthState};

pub const SLOT: &str = "chorus_api_key";

#[derive(Debug, Clone)]
struct ChorusSession {
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct MeetingsResponse {
    #[serde(default)]
    meetings: Vec<Meeting>,
}

#[derive(Debug, Clone, Deserialize)]
struct Meeting {
    id: String,
    #[serde(default)]
    title: String,
    start_time: DateTime<Utc>,
    #[serde(default)]
    recording_url: Option<String>,
}

impl Meeting {
    fn link(&self) -> String {
        self.recording_url
            .clone()
            .unwrap_or_else(|| format!("https://chorus.ai/meetings/{}", self.id))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Insights {
    #[serde(default)]
    action_items: Vec<ActionItem>,
    #[serde(default)]
    follow_ups: Vec<FollowUp>,
}

#[derive(Debug, Clone, Deserialize)]
struct ActionItem {
    id: String,
    title: String,
    #[serde(default)]
    assignee: String,
    #[serde(default)]
    priority: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FollowUp {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
}

pub struct ChorusAdapter {
    config: ChorusConfig,
    concurrency: usize,
    client: Client,
    core: AdapterCore<ChorusSession>,
}

impl ChorusAdapter {
    pub fn new(
        config: ChorusConfig,
        concurrency: usize,
        client: Client,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            concurrency: concurrency.max(1),
            client,
            core: AdapterCore::new(SLOT, credentials),
        }
    }

    async fn meetings(&self, api_key: &str) -> Result<Vec<Meeting>, FetchError> {
        let end = Utc::now();
        let start = end - Duration::days(self.config.lookback_days);
        let url = endpoint(
            &self.config.base_url,
            &format!(
                "meetings?start_date={}&end_date={}&limit={}",
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
                end.to_rfc3339_opts(SecondsFormat::Secs, true),
                self.config.meeting_limit
            ),
        );
        let response: MeetingsResponse = fetch_get(&self.client, &url, api_key).await?;
        Ok(response.meetings)
    }

    async fn insights(&self, api_key: &str, meeting_id: &str) -> Result<Insights, FetchError> {
        let url = endpoint(
            &self.config.base_url,
            &format!("meetings/{}/insights", meeting_id),
        );
        fetch_get(&self.client, &url, api_key).await
    }
}

/// Flatten one meeting and its insights into records.
fn meeting_records(meeting: &Meeting, insights: Option<&Insights>) -> Vec<NormalizedRecord> {
    let link = meeting.link();
    let Some(insights) = insights else {
        return vec![NormalizedRecord::new(RecordKind::Meeting, meeting.id.clone(), meeting.start_time)
            .with_title(meeting.title.clone())
            .with_url(link)
            .with_field("meeting_id", meeting.id.clone())];
    };

    let actions = insights.action_items.iter().map(|a| {
        NormalizedRecord::new(
            RecordKind::MeetingAction,
            format!("{}_{}", meeting.id, a.id),
            meeting.start_time,
        )
        .with_title(a.title.clone())
        .with_body(format!(
            "Action from meeting: {}\nAssigned to: {}",
            meeting.title, a.assignee
        ))
        .with_url(link.clone())
        .with_field(DECLARED_PRIORITY_FIELD, a.priority.clone())
        .with_field("meeting_id", meeting.id.clone())
        .with_field("assignee", a.assignee.clone())
    });

    let follow_ups = insights.follow_ups.iter().map(|f| {
        NormalizedRecord::new(
            RecordKind::MeetingFollowUp,
            format!("{}_followup_{}", meeting.id, f.id),
            meeting.start_time,
        )
        .with_title(format!("Follow up - {}", f.title))
        .with_body(format!(
            "Follow up from meeting: {}\n{}",
            meeting.title, f.description
        ))
        .with_url(link.clone())
        .with_field("meeting_id", meeting.id.clone())
    });

    actions.chain(follow_ups).collect()
}

#[async_trait]
impl Adapter for ChorusAdapter {
    fn name(&self) -> &str {
        "chorus"
    }

    fn description(&self) -> &str {
        "Action items and follow-ups from recorded Chorus meetings"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Chorus
    }

    fn credential_slot(&self) -> &str {
        self.core.slot()
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::MeetingAction
    }

    async fn authenticate(&self, credential: &str) -> Result<AuthState, AuthError> {
        let url = endpoint(&self.config.base_url, "meetings?limit=1");
        match auth_get::<serde_json::Value>(&self.client, &url, credential).await {
            Ok(_) => {
                let session = ChorusSession {
                    api_key: credential.to_string(),
                };
                self.core.establish(session, credential, "Connected").await?;
                tracing::info!("chorus authenticated");
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
            Some(key) => self.authenticate(&key).await.map(Some),
            None => Ok(None),
        }
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.core.clear().await
    }

    async fn fetch(&self) -> Result<Vec<NormalizedRecord>, FetchError> {
        let session = self.core.session().await.ok_or(FetchError::NotAuthenticated)?;
        let api_key = session.api_key.as_str();

        let meetings = match self.meetings(api_key).await {
            Ok(m) => m,
            Err(e) => {
                self.core.fetch_failed(&e).await;
                return Err(e);
            }
        };

        // Completion order is arbitrary; results are keyed by meeting id and
        // read back in listing order.
        let ids: Vec<String> = meetings.iter().map(|m| m.id.clone()).collect();
        let insights: HashMap<String, Result<Insights, FetchError>> = stream::iter(ids)
            .map(|id| async move {
                let result = self.insights(api_key, &id).await;
                (id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut records = Vec::new();
        let mut skipped = 0;
        for meeting in &meetings {
            let loaded = match insights.get(&meeting.id) {
                Some(Ok(i)) => Some(i),
                Some(Err(e)) => {
                    skipped += 1;
                    tracing::warn!(meeting = %meeting.id, error = %e, "meeting insights unavailable");
                    None
                }
                None => None,
            };
            records.extend(meeting_records(meeting, loaded));
        }

        self.core.fetch_succeeded(records.len(), skipped).await;
        Ok(records)
    }

    async fn state(&self) -> AdapterState {
        self.core.state().await
    }
}
