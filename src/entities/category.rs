// 🏷️ Category Entity - tagging dimension with display priority and colour
//
// Rows are shared by every user; only superadmins may mutate them (enforced
// server-side, mirrored in the categories page).

use super::de;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CATEGORY_TABLE: &str = "category";

/// Priority used when the input is empty or not a number
pub const DEFAULT_PRIORITY: i32 = 999;

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,

    pub name: String,

    /// Chart colour, e.g. "#22d3ee"
    #[serde(default)]
    pub color: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    /// Lower sorts first in pickers
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "de::opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_active() -> bool {
    true
}

/// Embedded `category:category_id(name,color)` relation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Insert/update payload written by the categories page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPayload {
    pub name: String,
    pub priority: i32,
    pub color: Option<String>,
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CategoryPayload {
    /// Trims the name, falls back to the default priority, and turns empty
    /// colour/icon into null.
    pub fn from_inputs(name: &str, priority: &str, color: &str, icon: &str) -> Self {
        CategoryPayload {
            name: name.trim().to_string(),
            priority: parse_priority(priority),
            color: non_empty(color),
            icon: non_empty(icon),
            updated_at: None,
        }
    }

    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

pub fn parse_priority(input: &str) -> i32 {
    let input = input.trim();
    if input.is_empty() {
        return DEFAULT_PRIORITY;
    }
    match input.parse::<f64>() {
        Ok(n) if n.is_finite() && n.abs() <= i32::MAX as f64 => n as i32,
        _ => DEFAULT_PRIORITY,
    }
}

fn non_empty(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
