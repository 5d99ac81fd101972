//! User-facing settings
//!
//! Settings are plain JSON. Every field has a default, so a partial file (or
//! an empty object) is valid.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Built-in category catalog, in load order.
pub const DEFAULT_CATEGORIES: [&str; 7] = [
    "offer", "paywall", "email", "signup", "consent", "donate", "message",
];

/// Quiescence window before a re-evaluation pass.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub debounce_ms: u64,
    pub categories: Vec<String>,
    /// Per-category switch; categories missing from the map are enabled.
    pub enabled_categories: BTreeMap<String, bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            enabled_categories: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Parse settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        self.enabled_categories.get(category).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.debounce(), Duration::from_millis(500));
        assert_eq!(settings.categories.len(), 7);
        assert_eq!(settings.categories[0], "offer");
    }

    #[test]
    fn test_partial_settings() {
        let settings =
            Settings::from_json(r#"{"debounceMs": 250, "enabledCategories": {"consent": false}}"#).unwrap();
        assert_eq!(settings.debounce_ms, 250);
        assert!(!settings.is_enabled("consent"));
        assert!(settings.is_enabled("paywall"));
        assert_eq!(settings.categories, Settings::default().categories);
    }

    #[test]
    fn test_malformed_settings_are_rejected() {
        assert!(Settings::from_json(r#"{"debounceMs": "soon"}"#).is_err());
    }
}
