//! TOML configuration.
//!
//! A single file carries the store location, the credential file, the user
//! profile used for mention detection, and per-adapter settings. The file
//! is read once at startup and written back only when the profile changes.
//!
//! ```toml
//! [store]
//! path = "./data/todos.sqlite"
//!
//! [credentials]
//! path = "./data/credentials.json"
//!
//! [profile]
//! user_name = "jdoe"
//! display_name = "Jane Doe"
//! email_addresses = ["jane@company.com"]
//! platform_user_id = "U024BE7LH"
//!
//! [sync]
//! enrichment_concurrency = 4
//! timeout_secs = 30
//!
//! [adapters.slack]
//! history_limit = 50
//!
//! [adapters.calendar]
//! lookahead_days = 7
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::profile::UserProfile;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("./data/credentials.json")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Upper bound on concurrent per-item enrichment calls.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enrichment_concurrency: default_enrichment_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_enrichment_concurrency() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub quip: QuipConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub chorus: ChorusConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuipConfig {
    #[serde(default = "default_quip_base_url")]
    pub base_url: String,
}

impl Default for QuipConfig {
    fn default() -> Self {
        Self {
            base_url: default_quip_base_url(),
        }
    }
}

fn default_quip_base_url() -> String {
    "https://platform.quip.com/1".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_slack_base_url")]
    pub base_url: String,
    /// Messages requested per channel.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            base_url: default_slack_base_url(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_slack_base_url() -> String {
    "https://slack.com/api".to_string()
}
fn default_history_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChorusConfig {
    #[serde(default = "default_chorus_base_url")]
    pub base_url: String,
    #[serde(default = "default_chorus_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_meeting_limit")]
    pub meeting_limit: u32,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            base_url: default_chorus_base_url(),
            lookback_days: default_chorus_lookback_days(),
            meeting_limit: default_meeting_limit(),
        }
    }
}

fn default_chorus_base_url() -> String {
    "https://api.chorus.ai/v1".to_string()
}
fn default_chorus_lookback_days() -> i64 {
    30
}
fn default_meeting_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailConfig {
    #[serde(default = "default_mail_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_mail_lookback_days(),
            probe_attempts: default_probe_attempts(),
            probe_delay_ms: default_probe_delay_ms(),
        }
    }
}

fn default_mail_lookback_days() -> i64 {
    7
}
fn default_probe_attempts() -> u32 {
    3
}
fn default_probe_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CalendarConfig {
    /// Days ahead of now to list events for.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: i64,
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            lookahead_days: default_lookahead_days(),
            probe_attempts: default_probe_attempts(),
            probe_delay_ms: default_probe_delay_ms(),
        }
    }
}

fn default_lookahead_days() -> i64 {
    7
}

impl Config {
    /// Defaults used when no config file exists yet.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                path: PathBuf::from("./data/todos.sqlite"),
            },
            credentials: CredentialsConfig::default(),
            profile: UserProfile::default(),
            sync: SyncConfig::default(),
            adapters: AdaptersConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Write the config back, creating the parent directory if needed.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    validate(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    if config.sync.enrichment_concurrency == 0 {
        anyhow::bail!("sync.enrichment_concurrency must be > 0");
    }
    if config.sync.timeout_secs == 0 {
        anyhow::bail!("sync.timeout_secs must be > 0");
    }
    if config.adapters.slack.history_limit == 0 {
        anyhow::bail!("adapters.slack.history_limit must be > 0");
    }
    if config.adapters.chorus.lookback_days < 1 {
        anyhow::bail!("adapters.chorus.lookback_days must be >= 1");
    }
    if config.adapters.mail.lookback_days < 1 {
        anyhow::bail!("adapters.mail.lookback_days must be >= 1");
    }
    if config.adapters.mail.probe_attempts == 0 {
        anyhow::bail!("adapters.mail.probe_attempts must be > 0");
    }
    if config.adapters.calendar.lookahead_days < 1 {
        anyhow::bail!("adapters.calendar.lookahead_days must be >= 1");
    }
    if config.adapters.calendar.probe_attempts == 0 {
        anyhow::bail!("adapters.calendar.probe_attempts must be > 0");
    }
    for (name, url) in [
        ("quip", &config.adapters.quip.base_url),
        ("slack", &config.adapters.slack.base_url),
        ("chorus", &config.adapters.chorus.base_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("adapters.{}.base_url must be an http(s) URL", name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_tables() {
        let config: Config = toml::from_str(
            r#"
[store]
path = "/tmp/todos.sqlite"
"#,
        )
        .unwrap();
        assert_eq!(config.sync.enrichment_concurrency, 4);
        assert_eq!(config.adapters.slack.history_limit, 50);
        assert_eq!(config.adapters.mail.probe_attempts, 3);
        assert_eq!(config.adapters.calendar.lookahead_days, 7);
        assert!(config.profile.display_name.is_empty());
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = Config::minimal();
        config.sync.enrichment_concurrency = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = Config::minimal();
        config.adapters.slack.base_url = "slack.com/api".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn save_then_load_keeps_profile() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config").join("td.toml");
        let mut config = Config::minimal();
        config.profile.display_name = "Jane Doe".to_string();
        config.profile.email_addresses = vec!["jane@company.com".to_string()];
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.profile.display_name, "Jane Doe");
        assert_eq!(loaded.profile.email_addresses, vec!["jane@company.com"]);
    }
}
