//! User profile and registration index records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::id::UserId;

const fn default_level() -> u32 {
    1
}

/// The player's profile document, created when registration completes.
///
/// Unknown fields written by other clients are preserved in `extra` so a
/// read-modify-write never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Platform user id this profile belongs to.
    pub line_user_id: UserId,
    /// In-game nickname.
    #[serde(default)]
    pub nickname: String,
    /// County (administrative region) the player chose.
    #[serde(default)]
    pub county: String,
    /// Player level, starting at 1.
    #[serde(default = "default_level")]
    pub level: u32,
    /// Coin balance.
    #[serde(default)]
    pub coins: u64,
    /// When registration completed. Unparseable stored values read as unknown.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_time: Option<DateTime<Utc>>,
    /// Display name captured at registration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Avatar URL captured at registration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub picture_url: String,
    /// Free-text status message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,
    /// Any other fields present in the stored document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Fields that must be non-empty for a profile to count as complete.
    pub const REQUIRED_FIELDS: &'static [&'static str] = &["nickname", "county"];

    /// Create a fresh level-1 profile with no coins.
    #[must_use]
    pub fn new(line_user_id: UserId, nickname: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            line_user_id,
            nickname: nickname.into(),
            county: county.into(),
            level: default_level(),
            coins: 0,
            registration_time: Some(Utc::now()),
            display_name: String::new(),
            picture_url: String::new(),
            status_message: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Names of required fields that are empty or whitespace.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        Self::REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| self.required_value(field).trim().is_empty())
            .collect()
    }

    fn required_value(&self, field: &str) -> &str {
        match field {
            "nickname" => &self.nickname,
            "county" => &self.county,
            _ => "",
        }
    }

    /// Whether this profile belongs to `user_id` and has every required field.
    #[must_use]
    pub fn is_complete_for(&self, user_id: &UserId) -> bool {
        self.line_user_id == *user_id && self.missing_fields().is_empty()
    }
}

/// RFC 3339 text or epoch milliseconds; anything else is treated as absent.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

/// Entry in the registered-users index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    /// Always true for a present entry.
    pub registered: bool,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    /// The backend confirmed the registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_verified: Option<bool>,
    /// The entry was rebuilt from a complete profile rather than written at
    /// registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_added: Option<bool>,
    /// The entry replaced an inconsistent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<bool>,
}

impl RegistrationRecord {
    /// Entry written when registration completes on this device.
    #[must_use]
    pub fn completed(profile: &UserProfile) -> Self {
        Self {
            registered: true,
            timestamp: Utc::now(),
            nickname: Some(profile.nickname.clone()),
            county: Some(profile.county.clone()),
            backend_verified: None,
            auto_added: None,
            fixed: None,
        }
    }

    /// Entry rebuilt from a complete profile found without an index entry.
    #[must_use]
    pub fn repaired_from(profile: &UserProfile) -> Self {
        Self {
            auto_added: Some(true),
            ..Self::completed(profile)
        }
    }

    /// Entry recorded after the backend confirmed the registration.
    #[must_use]
    pub fn verified(profile: Option<&UserProfile>) -> Self {
        Self {
            registered: true,
            timestamp: Utc::now(),
            nickname: profile.map(|p| p.nickname.clone()),
            county: profile.map(|p| p.county.clone()),
            backend_verified: Some(true),
            auto_added: None,
            fixed: None,
        }
    }
}
