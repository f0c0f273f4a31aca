//! The configured user and the identity checks that decide whether a piece
//! of text mentions them.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Who "you" are across the integrated services.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_addresses: Vec<String>,
    /// Chat platform user id (Slack `U…` id).
    #[serde(default)]
    pub platform_user_id: String,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_empty()
            && self.display_name.is_empty()
            && self.email_addresses.is_empty()
            && self.platform_user_id.is_empty()
    }

    /// Copy of this profile with the platform id filled in when unset.
    pub fn with_fallback_platform_id(&self, platform_user_id: Option<&str>) -> UserProfile {
        let mut profile = self.clone();
        if profile.platform_user_id.is_empty() {
            if let Some(id) = platform_user_id {
                profile.platform_user_id = id.to_string();
            }
        }
        profile
    }
}

/// How a source decides the user is mentioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionStyle {
    /// `@user_name`, display name, or a `<@ID>` token.
    Chat,
    /// User name, display name, or one of the email addresses.
    Mail,
    /// The source never mentions anyone.
    None,
}

impl MentionStyle {
    pub fn matches(&self, text: &str, profile: &UserProfile) -> bool {
        match self {
            MentionStyle::Chat => is_mentioned_in_chat(text, profile),
            MentionStyle::Mail => is_mentioned_in_mail(text, profile),
            MentionStyle::None => false,
        }
    }
}

pub fn is_mentioned_in_chat(text: &str, profile: &UserProfile) -> bool {
    let lower = text.to_lowercase();

    if !profile.user_name.is_empty()
        && lower.contains(&format!("@{}", profile.user_name.to_lowercase()))
    {
        return true;
    }

    if !profile.display_name.is_empty() && lower.contains(&profile.display_name.to_lowercase()) {
        return true;
    }

    !profile.platform_user_id.is_empty() && has_platform_token(text, &profile.platform_user_id)
}

pub fn is_mentioned_in_mail(text: &str, profile: &UserProfile) -> bool {
    let lower = text.to_lowercase();

    if !profile.user_name.is_empty() && lower.contains(&profile.user_name.to_lowercase()) {
        return true;
    }

    if !profile.display_name.is_empty() && lower.contains(&profile.display_name.to_lowercase()) {
        return true;
    }

    profile
        .email_addresses
        .iter()
        .filter(|addr| !addr.is_empty())
        .any(|addr| lower.contains(&addr.to_lowercase()))
}

/// Matches `<@U123>` and `<@U123|label>`, never a bare `U123` or `<@U1234>`.
fn has_platform_token(text: &str, user_id: &str) -> bool {
    let pattern = format!(r"<@{}(?:\|[^>]*)?>", regex::escape(user_id));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}
