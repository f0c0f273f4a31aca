//! Integration tests for the HTTP adapters.
//!
//! Each test starts an axum server on an ephemeral port that imitates the
//! relevant slice of the service API, then drives the real adapter against
//! it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use todo_harness::adapter_chorus::ChorusAdapter;
use todo_harness::adapter_quip::QuipAdapter;
use todo_harness::adapter_slack::{self, SlackAdapter};
use todo_harness::config::{ChorusConfig, QuipConfig, SlackConfig, SyncConfig};
use todo_harness::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use todo_harness::error::{AuthError, FetchError};
use todo_harness::http::build_client;
use todo_harness::models::{ItemPriority, RecordKind};
use todo_harness::profile::UserProfile;
use todo_harness::sync::{Outcome, SyncHub};
use todo_harness::traits::{Adapter, AdapterRegistry};

// ─── Helpers ────────────────────────────────────────────────────────

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn bearer(headers: &HeaderMap) -> &str {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

fn client() -> reqwest::Client {
    build_client(&SyncConfig::default()).unwrap()
}

// ─── Slack ──────────────────────────────────────────────────────────

async fn slack_auth(headers: HeaderMap) -> Json<Value> {
    if bearer(&headers) == "xoxb-good" {
        Json(json!({"ok": true, "user": "jdoe", "user_id": "U024BE7LH", "team": "Acme"}))
    } else {
        Json(json!({"ok": false, "error": "invalid_auth"}))
    }
}

async fn slack_channels() -> Json<Value> {
    Json(json!({
        "ok": true,
        "channels": [
            {"id": "C01", "name": "general", "is_archived": false},
            {"id": "C02", "name": "eng", "is_archived": false},
            {"id": "C03", "name": "old", "is_archived": true}
        ]
    }))
}

async fn slack_history(Query(q): Query<HashMap<String, String>>) -> Response {
    match q.get("channel").map(String::as_str) {
        Some("C01") => Json(json!({
            "ok": true,
            "messages": [
                {"ts": "1700000000.000100", "text": "<@U024BE7LH> can you look at the deploy", "user": "U2"},
                {"ts": "1700000000.000200", "text": "lunch is here", "user": "U3"}
            ]
        }))
        .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn slack_server() -> String {
    spawn(
        Router::new()
            .route("/auth.test", get(slack_auth))
            .route("/conversations.list", get(slack_channels))
            .route("/conversations.history", get(slack_history)),
    )
    .await
}

fn slack_adapter(base_url: String, credentials: Arc<dyn CredentialStore>) -> SlackAdapter {
    SlackAdapter::new(
        SlackConfig {
            base_url,
            history_limit: 50,
        },
        client(),
        credentials,
    )
}

#[tokio::test]
async fn slack_failed_auth_keeps_existing_session() {
    let base = slack_server().await;
    let credentials = Arc::new(MemoryCredentialStore::new());
    let slack = slack_adapter(base, credentials.clone());

    let err = slack.authenticate("xoxb-bad").await.unwrap_err();
    assert_eq!(err, AuthError::InvalidCredential);
    assert!(!slack.state().await.authenticated);
    assert_eq!(credentials.get(adapter_slack::SLOT).unwrap(), None);

    let auth = slack.authenticate("xoxb-good").await.unwrap();
    assert_eq!(auth.platform_user_id.as_deref(), Some("U024BE7LH"));
    assert_eq!(
        credentials.get(adapter_slack::SLOT).unwrap().as_deref(),
        Some("xoxb-good")
    );

    assert!(slack.authenticate("xoxb-bad").await.is_err());
    let state = slack.state().await;
    assert!(state.authenticated);
    assert!(state.last_error.is_some());
    assert_eq!(
        credentials.get(adapter_slack::SLOT).unwrap().as_deref(),
        Some("xoxb-good")
    );

    let records = slack.fetch().await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn slack_skips_failing_and_archived_channels() {
    let base = slack_server().await;
    let slack = slack_adapter(base, Arc::new(MemoryCredentialStore::new()));
    slack.authenticate("xoxb-good").await.unwrap();

    let records = slack.fetch().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.field("channel_id") == Some("C01")));
    assert_eq!(records[0].kind, RecordKind::Message);

    let state = slack.state().await;
    assert_eq!(state.status, "Sync complete (2 items, 1 skipped)");
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn slack_fetch_without_session_fails() {
    let slack = slack_adapter("http://127.0.0.1:9".into(), Arc::new(MemoryCredentialStore::new()));
    assert_eq!(slack.fetch().await.unwrap_err(), FetchError::NotAuthenticated);
}

#[tokio::test]
async fn slack_rate_limit_surfaces_on_state() {
    let base = spawn(
        Router::new()
            .route("/auth.test", get(slack_auth))
            .route(
                "/conversations.list",
                get(|| async { StatusCode::TOO_MANY_REQUESTS }),
            ),
    )
    .await;
    let slack = slack_adapter(base, Arc::new(MemoryCredentialStore::new()));
    slack.authenticate("xoxb-good").await.unwrap();

    assert_eq!(slack.fetch().await.unwrap_err(), FetchError::RateLimited);
    let state = slack.state().await;
    assert_eq!(state.status, "Sync failed");
    assert_eq!(state.last_error.as_deref(), Some("rate limited"));
}

#[tokio::test]
async fn slack_user_id_from_auth_drives_mentions() {
    let base = slack_server().await;
    let slack = Arc::new(slack_adapter(base, Arc::new(MemoryCredentialStore::new())));
    slack.authenticate("xoxb-good").await.unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(slack);
    let hub = SyncHub::new(registry, UserProfile::default());
    let report = hub.sync_all().await;

    assert_eq!(report.items.len(), 1);
    let item = &report.items[0];
    assert_eq!(item.id, "slack:C01:1700000000.000100");
    assert_eq!(item.title, "💬 You were mentioned: #general");
    assert_eq!(item.priority, ItemPriority::High);
    assert_eq!(item.source, "Slack Message");
    assert_eq!(
        report.outcomes[0].outcome,
        Outcome::Fetched {
            records: 2,
            candidates: 1
        }
    );
}

#[tokio::test]
async fn slack_restores_and_logs_out_with_file_credentials() {
    let base = slack_server().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("credentials.json");

    {
        let store = Arc::new(FileCredentialStore::open(&path).unwrap());
        let slack = slack_adapter(base.clone(), store);
        slack.authenticate("xoxb-good").await.unwrap();
    }

    let store = Arc::new(FileCredentialStore::open(&path).unwrap());
    let slack = slack_adapter(base, store.clone());
    assert!(!slack.state().await.authenticated);
    let restored = slack.restore().await.unwrap();
    assert!(restored.is_some());
    assert!(slack.state().await.authenticated);

    slack.logout().await.unwrap();
    assert!(!slack.state().await.authenticated);
    assert_eq!(store.get(adapter_slack::SLOT).unwrap(), None);
    assert_eq!(slack.restore().await.unwrap(), None);
}

// ─── Quip ───────────────────────────────────────────────────────────

async fn quip_user(headers: HeaderMap) -> Response {
    if bearer(&headers) != "quip-token" {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "id": "U1",
        "name": "Jane Doe",
        "private_folder_id": "F1",
        "shared_folder_ids": ["F2"],
        "group_folder_ids": []
    }))
    .into_response()
}

async fn quip_folders(Query(q): Query<HashMap<String, String>>) -> Response {
    if q.get("ids").map(String::as_str) != Some("F1,F2") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(json!({
        "F1": {"folder": {"id": "F1"}, "children": [{"thread_id": "T1"}, {"folder_id": "F9"}]},
        "F2": {"folder": {"id": "F2"}, "children": [{"thread_id": "T2"}, {"thread_id": "T1"}]}
    }))
    .into_response()
}

async fn quip_thread(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "T1" => Json(json!({
            "thread": {
                "id": "T1",
                "title": "Launch checklist",
                "link": "https://quip.com/T1",
                "created_usec": 1_700_000_000_000_000i64,
                "updated_usec": 1_700_000_100_000_000i64
            },
            "html": "<h1>Launch</h1><p>TODO: finalize copy</p>"
        }))
        .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[tokio::test]
async fn quip_walks_folders_and_skips_broken_threads() {
    let base = spawn(
        Router::new()
            .route("/users/current", get(quip_user))
            .route("/folders/", get(quip_folders))
            .route("/threads/{id}", get(quip_thread)),
    )
    .await;
    let quip = QuipAdapter::new(
        QuipConfig { base_url: base },
        client(),
        Arc::new(MemoryCredentialStore::new()),
    );

    assert_eq!(
        quip.authenticate("wrong").await.unwrap_err(),
        AuthError::InvalidCredential
    );
    let auth = quip.authenticate("quip-token").await.unwrap();
    assert_eq!(auth.account.as_deref(), Some("Jane Doe"));

    let records = quip.fetch().await.unwrap();
    assert_eq!(records.len(), 1);
    let doc = &records[0];
    assert_eq!(doc.id, "T1");
    assert_eq!(doc.body, "Launch TODO: finalize copy");
    assert_eq!(doc.url, "https://quip.com/T1");
    assert_eq!(quip.state().await.status, "Sync complete (1 items, 1 skipped)");
}

// ─── Chorus ─────────────────────────────────────────────────────────

async fn chorus_meetings(headers: HeaderMap) -> Response {
    if bearer(&headers) != "chorus-key" {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({
        "meetings": [
            {"id": "m1", "title": "Roadmap sync", "start_time": "2026-10-12T16:00:00Z", "end_time": "2026-10-12T17:00:00Z"},
            {"id": "m2", "title": "Weekly 1:1", "start_time": "2026-10-13T09:00:00Z", "recording_url": "https://chorus.ai/r/m2"}
        ]
    }))
    .into_response()
}

async fn chorus_insights(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "m1" => Json(json!({
            "action_items": [
                {"id": "a1", "title": "Draft pricing proposal", "assignee": "Jane", "priority": "high", "status": "open"}
            ],
            "follow_ups": [
                {"id": "f1", "title": "Send notes", "description": "Share with the sales team"}
            ]
        }))
        .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[tokio::test]
async fn chorus_enriches_meetings_and_degrades_on_insight_failure() {
    let base = spawn(
        Router::new()
            .route("/meetings", get(chorus_meetings))
            .route("/meetings/{id}/insights", get(chorus_insights)),
    )
    .await;
    let chorus = Arc::new(ChorusAdapter::new(
        ChorusConfig {
            base_url: base,
            lookback_days: 30,
            meeting_limit: 100,
        },
        2,
        client(),
        Arc::new(MemoryCredentialStore::new()),
    ));

    assert_eq!(
        chorus.authenticate("nope").await.unwrap_err(),
        AuthError::InvalidCredential
    );
    chorus.authenticate("chorus-key").await.unwrap();

    let records = chorus.fetch().await.unwrap();
    let kinds: Vec<RecordKind> = records.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RecordKind::MeetingAction,
            RecordKind::MeetingFollowUp,
            RecordKind::Meeting
        ]
    );
    assert_eq!(records[2].url, "https://chorus.ai/r/m2");

    let mut registry = AdapterRegistry::new();
    registry.register(chorus);
    let report = SyncHub::new(registry, UserProfile::default()).sync_all().await;

    // The bare meeting has no actionable text and is dropped.
    assert_eq!(report.items.len(), 2);
    let action = &report.items[0];
    assert_eq!(action.id, "chorus:m1_a1");
    assert_eq!(action.title, "Chorus: Draft pricing proposal");
    assert_eq!(action.priority, ItemPriority::High);
    assert_eq!(action.source, "Chorus Meeting");
    assert_eq!(
        action.due_date.unwrap().to_rfc3339(),
        "2026-10-15T16:00:00+00:00"
    );

    let follow_up = &report.items[1];
    assert_eq!(follow_up.title, "Chorus: Follow up - Send notes");
    assert_eq!(follow_up.priority, ItemPriority::Medium);
    assert_eq!(follow_up.source, "Chorus Follow-up");
    assert_eq!(
        follow_up.due_date.unwrap().to_rfc3339(),
        "2026-10-19T16:00:00+00:00"
    );
}
