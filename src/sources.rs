//! Adapter and profile setup commands: `td sources`, `td auth`,
//! `td logout`, `td profile`.

use std::io::BufRead;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::{save_config, Config};
use crate::profile::UserProfile;
use crate::sync::SyncHub;

pub async fn list_sources(config: &Config) -> Result<()> {
    let hub = SyncHub::from_config(config)?;
    hub.restore_all().await;

    println!(
        "{:<10} {:<14} {:<40} LAST SYNC",
        "ADAPTER", "CONNECTED", "STATUS"
    );
    for adapter in hub.registry().adapters() {
        let state = adapter.state().await;
        let last_sync = state
            .last_sync
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<14} {:<40} {}",
            adapter.name(),
            state.authenticated,
            state.status,
            last_sync
        );
        if let Some(err) = state.last_error {
            println!("{:<10} error: {}", "", err);
        }
    }
    Ok(())
}

/// Read a credential from stdin when none was passed on the command line.
fn read_credential() -> Result<String> {
    eprint!("credential: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read credential from stdin")?;
    let credential = line.trim().to_string();
    if credential.is_empty() {
        bail!("No credential given");
    }
    Ok(credential)
}

pub async fn run_auth(config: &Config, adapter: &str, token: Option<String>) -> Result<()> {
    let hub = SyncHub::from_config(config)?;
    let Some(adapter) = hub.registry().get(adapter) else {
        bail!("Unknown adapter: '{}'", adapter);
    };

    let credential = match token {
        Some(t) => t,
        None if !adapter.needs_credential() => String::new(),
        None => read_credential()?,
    };

    let auth = adapter
        .authenticate(&credential)
        .await
        .with_context(|| format!("{} authentication failed", adapter.name()))?;
    let state = adapter.state().await;
    match auth.account {
        Some(account) => println!("{}: {} as {}", adapter.name(), state.status, account),
        None => println!("{}: {}", adapter.name(), state.status),
    }
    Ok(())
}

pub async fn run_logout(config: &Config, adapter: &str) -> Result<()> {
    let hub = SyncHub::from_config(config)?;
    let Some(adapter) = hub.registry().get(adapter) else {
        bail!("Unknown adapter: '{}'", adapter);
    };
    adapter.logout().await?;
    println!("{}: logged out", adapter.name());
    Ok(())
}

pub fn show_profile(profile: &UserProfile) {
    println!("user_name:        {}", profile.user_name);
    println!("display_name:     {}", profile.display_name);
    println!("email_addresses:  {}", profile.email_addresses.join(", "));
    println!("platform_user_id: {}", profile.platform_user_id);
}

/// Update the fields that were given and write the config back.
pub fn set_profile(
    config_path: &Path,
    mut config: Config,
    user_name: Option<String>,
    display_name: Option<String>,
    emails: Option<Vec<String>>,
    platform_user_id: Option<String>,
) -> Result<()> {
    let profile = &mut config.profile;
    if let Some(v) = user_name {
        profile.user_name = v;
    }
    if let Some(v) = display_name {
        profile.display_name = v;
    }
    if let Some(v) = emails {
        profile.email_addresses = v;
    }
    if let Some(v) = platform_user_id {
        profile.platform_user_id = v;
    }
    save_config(config_path, &config)?;
    show_profile(&config.profile);
    Ok(())
}
