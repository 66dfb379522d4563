// Profile - per-user row next to the auth account

use serde::{Deserialize, Serialize};

pub const PROFILE_TABLE: &str = "profile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub is_superadmin: bool,
}

fn default_active() -> bool {
    true
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Profile {
    /// full name → username → fallback (usually the session email)
    pub fn display_name(&self, fallback: &str) -> String {
        filled(&self.full_name)
            .or_else(|| filled(&self.username))
            .unwrap_or(fallback)
            .to_string()
    }

    /// Member label in group management: full name → username → email
    pub fn label(&self) -> String {
        filled(&self.full_name)
            .or_else(|| filled(&self.username))
            .or_else(|| filled(&self.email))
            .unwrap_or(&self.user_id)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_fallback_chain() {
        let mut profile: Profile = serde_json::from_value(json!({
            "user_id": "u-1",
            "username": "ania",
            "full_name": "Anna Nowak",
        }))
        .unwrap();
        assert_eq!(profile.display_name("a@example.com"), "Anna Nowak");

        profile.full_name = Some("  ".to_string());
        assert_eq!(profile.display_name("a@example.com"), "ania");

        profile.username = None;
        assert_eq!(profile.display_name("a@example.com"), "a@example.com");
        assert!(profile.is_active);
        assert!(!profile.is_superadmin);
    }

    #[test]
    fn test_label_uses_email_last() {
        let profile: Profile = serde_json::from_value(json!({
            "user_id": "u-2",
            "email": "b@example.com",
        }))
        .unwrap();
        assert_eq!(profile.label(), "b@example.com");
    }
}
