//! Quip adapter.
//!
//! Walks the current user's top-level folders (private, shared, group) one
//! level deep and loads every document thread found there. Document HTML is
//! reduced to plain text so the classifier can scan it.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use crate::config::QuipConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, FetchError};
use crate::http::{auth_get, endpoint, fetch_get};
use crate::models::{NormalizedRecord, RecordKind, SourceType};
use crate::traits::{Adapter, AdapterCore, AdapterState, AuthState};

pub const SLOT: &str = "quip_token";

#[derive(Debug, Clone)]
struct QuipSession {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    private_folder_id: Option<String>,
    #[serde(default)]
    shared_folder_ids: Vec<String>,
    #[serde(default)]
    group_folder_ids: Vec<String>,
}

impl CurrentUser {
    fn folder_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.private_folder_id
            .iter()
            .chain(&self.shared_folder_ids)
            .chain(&self.group_folder_ids)
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct Folder {
    #[serde(default)]
    children: Vec<FolderChild>,
}

#[derive(Debug, Deserialize)]
struct FolderChild {
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    thread: Thread,
    #[serde(default)]
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thread {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    created_usec: i64,
    #[serde(default)]
    updated_usec: i64,
}

pub struct QuipAdapter {
    config: QuipConfig,
    client: Client,
    core: AdapterCore<QuipSession>,
}

impl QuipAdapter {
    pub fn new(config: QuipConfig, client: Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            client,
            core: AdapterCore::new(SLOT, credentials),
        }
    }

    async fn thread_ids(&self, token: &str) -> Result<Vec<String>, FetchError> {
        let user: CurrentUser =
            fetch_get(&self.client, &endpoint(&self.config.base_url, "users/current"), token)
                .await?;
        let folder_ids = user.folder_ids();
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = endpoint(
            &self.config.base_url,
            &format!("folders/?ids={}", folder_ids.join(",")),
        );
        let folders: HashMap<String, Folder> = fetch_get(&self.client, &url, token).await?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        // Keep the user's folder order rather than the map's.
        for folder_id in &folder_ids {
            let Some(folder) = folders.get(folder_id) else {
                continue;
            };
            for child in &folder.children {
                if let Some(id) = &child.thread_id {
                    if seen.insert(id.clone()) {
                        ids.push(id.clone());
                    }
                }
            }
        }
        Ok(ids)
    }

    async fn thread(&self, token: &str, id: &str) -> Result<NormalizedRecord, FetchError> {
        let url = endpoint(&self.config.base_url, &format!("threads/{}", id));
        let response: ThreadResponse = fetch_get(&self.client, &url, token).await?;
        Ok(to_record(response))
    }
}

fn to_record(response: ThreadResponse) -> NormalizedRecord {
    let thread = response.thread;
    let created = DateTime::from_timestamp_micros(thread.created_usec).unwrap_or_default();
    let body = response.html.as_deref().map(html_to_text).unwrap_or_default();
    NormalizedRecord::new(RecordKind::Document, thread.id, created)
        .with_title(thread.title)
        .with_body(body)
        .with_url(thread.link)
        .with_field("updated_usec", thread.updated_usec.to_string())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"))
}

/// Strip tags, decode the common entities, and collapse whitespace.
pub fn html_to_text(html: &str) -> String {
    let stripped = tag_regex().replace_all(html, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Adapter for QuipAdapter {
    fn name(&self) -> &str {
        "quip"
    }

    fn description(&self) -> &str {
        "Quip documents with todos or action items"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Quip
    }

    fn credential_slot(&self) -> &str {
        self.core.slot()
    }

    fn record_kind(&self) -> RecordKind {
        RecordKind::Document
    }

    async fn authenticate(&self, credential: &str) -> Result<AuthState, AuthError> {
        let url = endpoint(&self.config.base_url, "users/current");
        match auth_get::<CurrentUser>(&self.client, &url, credential).await {
            Ok(user) => {
                let session = QuipSession {
                    token: credential.to_string(),
                };
                self.core.establish(session, credential, "Connected").await?;
                tracing::info!(user = ?user.name, "quip authenticated");
                Ok(AuthState {
                    account: user.name,
                    platform_user_id: None,
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

        let ids = match self.thread_ids(&session.token).await {
            Ok(ids) => ids,
            Err(e) => {
                self.core.fetch_failed(&e).await;
                return Err(e);
            }
        };

        let mut records = Vec::with_capacity(ids.len());
        let mut skipped = 0;
        for id in &ids {
            match self.thread(&session.token, id).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(thread = %id, error = %e, "skipping quip document");
                }
            }
        }

        self.core.fetch_succeeded(records.len(), skipped).await;
        Ok(records)
    }

    async fn state(&self) -> AdapterState {
        self.core.state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_becomes_plain_text() {
        let html = "<h1>Launch&nbsp;plan</h1><ul><li>TODO: draft &amp; review</li></ul>";
        assert_eq!(html_to_text(html), "Launch plan TODO: draft & review");
    }

    #[test]
    fn folder_ids_are_unique_and_ordered() {
        let user = CurrentUser {
            name: None,
            private_folder_id: Some("P".into()),
            shared_folder_ids: vec!["S1".into(), "P".into()],
            group_folder_ids: vec!["G1".into(), "S1".into()],
        };
        assert_eq!(user.folder_ids(), vec!["P", "S1", "G1"]);
    }

    #[test]
    fn thread_timestamps_are_microseconds() {
        let record = to_record(ThreadResponse {
            thread: Thread {
                id: "T1".into(),
                title: "Q4 action items".into(),
                link: "https://quip.com/T1".into(),
                created_usec: 1_700_000_000_000_000,
                updated_usec: 0,
            },
            html: None,
        });
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(record.kind, RecordKind::Document);
        assert!(record.body.is_empty());
    }
}
