//! Typed input for the settings-permission rules.
//!
//! The decision engine treats input as an opaque JSON document; this is the
//! shape the shipped rules read. Callers that know the user record build one
//! of these instead of hand-assembling JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPermissionQuery {
    pub is_banned: bool,
    pub user_id: i64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<DateTime<Utc>>,
    #[serde(default)]
    pub update_history: UpdateHistory,
}

/// Past changes to fields whose edits are rate-limited by the rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateHistory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usernames: Vec<UpdateChange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dobs: Vec<UpdateChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateChange {
    pub new_value: String,
    pub previous_value: String,
    pub time: DateTime<Utc>,
}

impl SettingsPermissionQuery {
    pub fn for_user(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn to_input(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
