use std::fs;
use std::path::Path;

use serde_json::Value;

use um_compiler::{CategoryDefinitions, RuleSetBuilder};
use um_core::{Registry, RuleIndex, Settings};

/// Rules compiled per category, in compile order.
#[derive(Debug)]
pub struct CompileReport {
    pub index: RuleIndex,
    pub per_category: Vec<(String, usize)>,
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e))
}

/// Load `<dir>/<category>.json` for every configured category.
///
/// Categories without a file are skipped.
pub fn load_categories(dir: &Path, settings: &Settings) -> Result<Vec<CategoryDefinitions>, String> {
    let mut categories = Vec::with_capacity(settings.categories.len());
    for category in &settings.categories {
        let path = dir.join(format!("{category}.json"));
        if !path.exists() {
            tracing::debug!("no definitions for {} at {}", category, path.display());
            continue;
        }
        categories.push(CategoryDefinitions::new(category, read_json(&path)?));
    }
    Ok(categories)
}

/// Load a user overlay keyed by category.
pub fn load_overlay(path: &Path) -> Result<Vec<CategoryDefinitions>, String> {
    CategoryDefinitions::from_overlay(&read_json(path)?).map_err(|e| format!("Invalid overlay: {e}"))
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings, String> {
    match path {
        Some(path) => {
            let text =
                fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            Settings::from_json(&text).map_err(|e| format!("Invalid settings in '{}': {}", path.display(), e))
        }
        None => Ok(Settings::default()),
    }
}

/// Compile built-in definitions, then the overlay, into one index.
pub fn compile(dir: &Path, overlay: Option<&Path>, settings: &Settings) -> Result<CompileReport, String> {
    let mut categories = load_categories(dir, settings)?;
    let builtin = categories.len();
    if let Some(path) = overlay {
        categories.extend(load_overlay(path)?);
    }

    let registry = Registry::default();
    let mut builder = RuleSetBuilder::new(&registry);
    let mut per_category = Vec::with_capacity(categories.len());
    for (i, category) in categories.iter().enumerate() {
        let added = builder
            .add_category(&category.category, &category.definitions)
            .map_err(|e| format!("{}: {}", category.category, e))?;
        let label = if i < builtin {
            category.category.clone()
        } else {
            format!("{} (overlay)", category.category)
        };
        per_category.push((label, added));
    }

    Ok(CompileReport {
        index: RuleIndex::with_settings(builder.build(), settings),
        per_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_compile_directory_with_overlay() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "paywall.json",
            r#"{ "example.com": { "if $(.close-btn)": { ".modal": "remove" } } }"#,
        );
        write(dir.path(), "consent.json", r##"{ "*": { "#cookie-banner": "remove" } }"##);
        write(dir.path(), "overlay.json", r#"{ "paywall": { "example.com": { ".wall": "remove" } } }"#);

        let settings = Settings::default();
        let report = compile(dir.path(), Some(&dir.path().join("overlay.json")), &settings).unwrap();
        assert_eq!(
            report.per_category,
            vec![
                ("paywall".to_string(), 1),
                ("consent".to_string(), 1),
                ("paywall (overlay)".to_string(), 1),
            ]
        );
        assert_eq!(report.index.pattern_count(), 2);
        assert_eq!(report.index.select("https://example.com/").len(), 3);
    }

    #[test]
    fn test_compile_error_names_category_and_pattern() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "offer.json", r#"{ "example.com": { ".promo": "vanish" } }"#);
        let err = compile(dir.path(), None, &Settings::default()).unwrap_err();
        assert_eq!(err, "offer: Invalid action function: vanish in example.com");
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "email.json", "{ nope");
        let err = compile(dir.path(), None, &Settings::default()).unwrap_err();
        assert!(err.starts_with("Invalid JSON in"));
    }

    #[test]
    fn test_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "settings.json", r#"{ "enabledCategories": { "consent": false } }"#);
        let settings = load_settings(Some(&dir.path().join("settings.json"))).unwrap();
        assert!(!settings.is_enabled("consent"));
        assert_eq!(load_settings(None).unwrap(), Settings::default());
    }
}
