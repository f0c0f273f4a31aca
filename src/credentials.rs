//! Named credential slots.
//!
//! Each adapter persists its token under a fixed slot (`slack_token`,
//! `quip_token`, …). A missing slot means "not authenticated" at startup;
//! a present one is re-validated before the adapter is marked live.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};

pub trait CredentialStore: Send + Sync {
    fn get(&self, slot: &str) -> Result<Option<String>>;
    fn set(&self, slot: &str, value: &str) -> Result<()>;
    fn remove(&self, slot: &str) -> Result<()>;
}

/// JSON file of `{ slot: value }`, rewritten on every change.
pub struct FileCredentialStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

fn lock(slots: &Mutex<BTreeMap<String, String>>) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
    slots
        .lock()
        .map_err(|_| anyhow::anyhow!("credential store lock poisoned"))
}

impl FileCredentialStore {
    /// Load the file if it exists; a missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let slots = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read credentials: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse credentials: {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            slots: Mutex::new(slots),
        })
    }

    fn persist(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(slots)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write credentials: {}", self.path.display()))?;
        restrict_permissions(&self.path)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, slot: &str) -> Result<Option<String>> {
        Ok(lock(&self.slots)?.get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &str) -> Result<()> {
        let mut slots = lock(&self.slots)?;
        slots.insert(slot.to_string(), value.to_string());
        self.persist(&slots)
    }

    fn remove(&self, slot: &str) -> Result<()> {
        let mut slots = lock(&self.slots)?;
        if slots.remove(slot).is_some() {
            self.persist(&slots)?;
        }
        Ok(())
    }
}

/// Process-local store for tests.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, slot: &str) -> Result<Option<String>> {
        Ok(lock(&self.slots)?.get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &str) -> Result<()> {
        lock(&self.slots)?.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        lock(&self.slots)?.remove(slot);
        Ok(())
    }
}
