//! Shared HTTP plumbing for the token-based adapters.
//!
//! All three web services authenticate with `Authorization: Bearer …` and
//! answer JSON. Status handling is centralized here so every adapter maps
//! 401/403/429 the same way.

use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::SyncConfig;
use crate::error::{AuthError, FetchError};

pub fn build_client(config: &SyncConfig) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(concat!("todo-harness/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Join a base URL and a path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// `GET` a JSON document during authentication.
///
/// 401/403 mean the credential was rejected; any other non-success status
/// is a service error.
pub async fn auth_get<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    token: &str,
) -> Result<T, AuthError> {
    tracing::debug!(url, "auth request");
    let response = client.get(url).bearer_auth(token).send().await?;
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AuthError::InvalidCredential);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Service(format!("HTTP {}: {}", status, body)));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AuthError::Service(format!("unexpected response: {}", e)))
}

/// `GET` a JSON document during a fetch.
pub async fn fetch_get<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    token: &str,
) -> Result<T, FetchError> {
    tracing::debug!(url, "fetch request");
    let response = client.get(url).bearer_auth(token).send().await?;
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Service(format!("HTTP {}: {}", status, body)));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_once() {
        assert_eq!(
            endpoint("https://slack.com/api/", "/auth.test"),
            "https://slack.com/api/auth.test"
        );
        assert_eq!(
            endpoint("http://127.0.0.1:9000", "meetings?limit=1"),
            "http://127.0.0.1:9000/meetings?limit=1"
        );
    }
}
