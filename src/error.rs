//! Error taxonomy for the adapter boundary.
//!
//! Classification has no error type: a record that is not actionable is
//! simply dropped. Everything above the adapters (config, store, CLI) uses
//! `anyhow`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid credential")]
    InvalidCredential,

    #[error("service error: {0}")]
    Service(String),

    /// The local automation target (e.g. Mail.app) could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("service error: {0}")]
    Service(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("sync cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            FetchError::RateLimited
        } else {
            FetchError::Network(e.to_string())
        }
    }
}
