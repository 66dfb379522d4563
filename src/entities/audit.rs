// 📜 Audit entry - one row of the `audit_log_ui` view
//
// Written by database triggers; the application only reads it.

use super::de;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const AUDIT_VIEW: &str = "audit_log_ui";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(default)]
    pub id: Value,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub user_name: Option<String>,

    #[serde(default)]
    pub user_full_name: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub category_name: Option<String>,

    #[serde(default)]
    pub changed_fields: Option<Vec<String>>,

    #[serde(default)]
    pub old_data: Value,

    #[serde(default)]
    pub new_data: Value,

    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub performed_at: Option<DateTime<Utc>>,
}

impl AuditEntry {
    pub fn actor(&self) -> &str {
        self.user_name
            .as_deref()
            .or(self.user_full_name.as_deref())
            .or(self.username.as_deref())
            .unwrap_or("—")
    }

    pub fn changed_summary(&self) -> String {
        match &self.changed_fields {
            Some(fields) if !fields.is_empty() => fields.join(", "),
            _ => "-".to_string(),
        }
    }

    pub fn old_pretty(&self) -> String {
        pretty(&self.old_data)
    }

    pub fn new_pretty(&self) -> String {
        pretty(&self.new_data)
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
