// ⚙️ Configuration - backend endpoint from the environment, preferences on disk
//
// BackendConfig: where the managed backend lives and which anon key to send.
// Preferences: small per-user state that survives restarts (theme, view mode,
// active group, persisted session), stored as JSON in the user config dir.

use crate::backend::Session;
use crate::entities::Group;
use crate::error::{BackendError, BackendResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CURRENCY: &str = "PLN";
pub const APP_DIR: &str = "expense-dashboard";
const PREFERENCES_FILE: &str = "preferences.json";

// ============================================================================
// BACKEND CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project URL, e.g. https://xyzcompany.supabase.co (no trailing slash)
    pub url: String,
    /// Public anon key, sent as `apikey` on every request
    pub anon_key: String,
    /// Currency the dashboard and analysis pages aggregate over
    pub default_currency: String,
    pub user_agent: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            user_agent: format!("expense-dashboard/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        let currency = normalize_currency(&currency.into());
        if !currency.is_empty() {
            self.default_currency = currency;
        }
        self
    }

    /// Read EXPENSE_BACKEND_URL / EXPENSE_BACKEND_ANON_KEY, falling back to
    /// the SUPABASE_* names the hosted dashboard hands out.
    pub fn from_env() -> BackendResult<Self> {
        let url = env_any(&["EXPENSE_BACKEND_URL", "SUPABASE_URL"])
            .ok_or(BackendError::MissingConfig("EXPENSE_BACKEND_URL"))?;
        let anon_key = env_any(&["EXPENSE_BACKEND_ANON_KEY", "SUPABASE_ANON_KEY"])
            .ok_or(BackendError::MissingConfig("EXPENSE_BACKEND_ANON_KEY"))?;

        let mut config = Self::new(url, anon_key);
        if let Some(currency) = env_any(&["EXPENSE_DEFAULT_CURRENCY"]) {
            config = config.with_currency(currency);
        }
        Ok(config)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Currency codes are upper-case and at most three characters, the same
/// clamp every currency input applies while typing.
pub fn normalize_currency(input: &str) -> String {
    input.trim().to_uppercase().chars().take(3).collect()
}

// ============================================================================
// PREFERENCES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

/// Personal entries vs. group aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    My,
    Group,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::My => "my",
            ViewMode::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "my" | "me" => Some(ViewMode::My),
            "group" => Some(ViewMode::Group),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ViewMode::My => ViewMode::Group,
            ViewMode::Group => ViewMode::My,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ViewMode::My => "My View",
            ViewMode::Group => "Group View",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,

    #[serde(default)]
    pub view_mode: ViewMode,

    /// Last group picked in any group-mode page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_group: Option<Group>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
}

impl Preferences {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(PREFERENCES_FILE))
    }

    /// Missing file means first run; a corrupt file is replaced by defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading preferences from {}", path.display()))?;

        match serde_json::from_str(&raw) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable preferences");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).with_context(|| format!("writing preferences to {}", path.display()))?;
        Ok(())
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn remember_group(&mut self, group: &Group) {
        self.active_group = Some(group.clone());
    }

    pub fn forget_session(&mut self) {
        self.session = None;
    }
}
