//! `osascript` runner shared by the local-application adapters.
//!
//! Listing scripts print records separated by ASCII 30 and fields by
//! ASCII 31, so free text (subjects, notes, bodies) can carry newlines.

use std::future::Future;
use std::time::Duration;

use tokio::process::Command;

use crate::error::AuthError;

pub const FIELD_SEP: char = '\u{1f}';
pub const RECORD_SEP: char = '\u{1e}';

/// AppleScript preamble binding `fs` and `rs` to the separators.
pub const SEPARATORS: &str = "set fs to ASCII character 31\nset rs to ASCII character 30\n";

#[derive(Debug)]
pub enum ScriptError {
    /// `osascript` could not be started.
    Missing(String),
    /// The script ran and failed; carries stderr.
    Failed(String),
}

impl ScriptError {
    pub fn into_message(self) -> String {
        match self {
            ScriptError::Missing(e) => format!("osascript not available: {}", e),
            ScriptError::Failed(e) => e,
        }
    }
}

pub async fn run(script: &str) -> Result<String, ScriptError> {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .output()
        .await
        .map_err(|e| ScriptError::Missing(e.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ScriptError::Failed(stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Split listing output into records of exactly `fields` fields. The last
/// field keeps any stray field separators. Returns the records and the
/// number of malformed ones.
pub fn split_records(output: &str, fields: usize) -> (Vec<Vec<&str>>, usize) {
    let mut records = Vec::new();
    let mut bad = 0;
    for raw in output.split(RECORD_SEP) {
        if raw.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = raw.splitn(fields, FIELD_SEP).collect();
        if parts.len() == fields && !parts[0].trim().is_empty() {
            records.push(parts);
        } else {
            bad += 1;
        }
    }
    (records, bad)
}

/// Probe a local application up to `attempts` times, `delay_ms` apart, so
/// an automation permission prompt has time to be answered. Returns the
/// last error when every attempt fails.
pub async fn probe_with_retries<F, Fut>(
    app: &str,
    attempts: u32,
    delay_ms: u64,
    mut probe: F,
) -> Result<(), AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AuthError>>,
{
    let attempts = attempts.max(1);
    let mut last = AuthError::Unavailable(format!("{} not probed", app));
    for attempt in 1..=attempts {
        match probe().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(app, attempt, error = %e, "probe failed");
                last = e;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    Err(last)
}
