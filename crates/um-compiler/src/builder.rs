use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use um_core::pattern::SitePattern;
use um_core::registry::Registry;
use um_core::types::{CompiledPatternEntry, Rule};

use crate::error::DefinitionError;
use crate::parser::parse_body;

/// Raw definitions of one category: `pattern → body | [body, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinitions {
    pub category: String,
    pub definitions: Value,
}

impl CategoryDefinitions {
    pub fn new(category: &str, definitions: Value) -> Self {
        Self {
            category: category.to_string(),
            definitions,
        }
    }

    /// Split a user overlay `{ category: definitions, ... }` into categories.
    pub fn from_overlay(overlay: &Value) -> Result<Vec<Self>, DefinitionError> {
        let categories = overlay
            .as_object()
            .ok_or_else(|| DefinitionError::InvalidDefinitions(overlay.to_string()))?;
        Ok(categories
            .iter()
            .map(|(category, definitions)| Self::new(category, definitions.clone()))
            .collect())
    }
}

/// Accumulates compiled rules grouped by exact pattern string.
///
/// Patterns keep first-seen order; within a pattern, rules keep append order
/// across categories. Each distinct pattern string is compiled once.
pub struct RuleSetBuilder<'r> {
    registry: &'r Registry,
    entries: Vec<CompiledPatternEntry>,
    positions: HashMap<String, usize>,
}

impl<'r> RuleSetBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Compile one category. Returns the number of rules added.
    ///
    /// Nothing is added if any pattern of the category fails.
    pub fn add_category(&mut self, category: &str, definitions: &Value) -> Result<usize, DefinitionError> {
        let patterns = definitions
            .as_object()
            .ok_or_else(|| DefinitionError::InvalidDefinitions(definitions.to_string()))?;

        let mut compiled: Vec<(&str, Option<SitePattern>, Vec<Rule>)> = Vec::with_capacity(patterns.len());
        for (pattern, bodies) in patterns {
            let site = if self.positions.contains_key(pattern.as_str()) {
                None
            } else {
                let site = SitePattern::compile(pattern).map_err(|e| DefinitionError::from(e).in_pattern(pattern))?;
                Some(site)
            };
            let rules = self
                .compile_bodies(category, bodies)
                .map_err(|e| e.in_pattern(pattern))?;
            compiled.push((pattern.as_str(), site, rules));
        }

        let mut added = 0;
        for (pattern, site, rules) in compiled {
            added += rules.len();
            let position = match (self.positions.get(pattern), site) {
                (Some(&position), _) => position,
                (None, Some(site)) => {
                    self.entries.push(CompiledPatternEntry::new(site));
                    self.positions.insert(pattern.to_string(), self.entries.len() - 1);
                    self.entries.len() - 1
                }
                // The pattern was compiled above whenever it was unknown.
                (None, None) => continue,
            };
            self.entries[position].rules.extend(rules);
        }

        log::debug!("compiled category {}: {} rules", category, added);
        Ok(added)
    }

    fn compile_bodies(&self, category: &str, bodies: &Value) -> Result<Vec<Rule>, DefinitionError> {
        let mut rules = Vec::new();
        match bodies {
            Value::Array(items) => {
                for body in items {
                    rules.extend(parse_body(category, body, self.registry)?);
                }
            }
            body => rules.extend(parse_body(category, body, self.registry)?),
        }
        Ok(rules)
    }

    pub fn pattern_count(&self) -> usize {
        self.entries.len()
    }

    pub fn build(self) -> Vec<CompiledPatternEntry> {
        self.entries
    }
}

/// Compile every category in order into one rule set.
///
/// All or nothing: the first failure is returned, annotated with its pattern.
pub fn compile_definitions(
    categories: &[CategoryDefinitions],
    registry: &Registry,
) -> Result<Vec<CompiledPatternEntry>, DefinitionError> {
    let mut builder = RuleSetBuilder::new(registry);
    for category in categories {
        builder.add_category(&category.category, &category.definitions)?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use um_core::index::RuleIndex;

    use crate::error::TokenizeError;

    #[test]
    fn test_end_to_end_example() {
        let raw = json!({ "ads": { "example.com": { "if $(.close-btn)": { ".modal": "remove" } } } });
        let categories = CategoryDefinitions::from_overlay(&raw).unwrap();
        let entries = compile_definitions(&categories, &Registry::default()).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pattern.as_str(), "example.com");
        let rules = RuleIndex::new(entries).select("https://example.com");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].category(), "ads");
        assert_eq!(rules[0].conditions()[0].to_string(), "$(.close-btn)");
    }

    #[test]
    fn test_shared_pattern_merges_across_categories() {
        let categories = vec![
            CategoryDefinitions::new("paywall", json!({ "example.com": { ".paywall": "remove" }, "*": { "#a": "remove" } })),
            CategoryDefinitions::new(
                "email",
                json!({ "example.com": [ { ".newsletter": "remove" }, { ".signup": "remove" } ] }),
            ),
        ];
        let entries = compile_definitions(&categories, &Registry::default()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pattern.as_str(), "example.com");
        assert_eq!(entries[1].pattern.as_str(), "*");
        let order: Vec<(&str, &str)> = entries[0]
            .rules
            .iter()
            .map(|r| (r.category(), r.actions()[0].selector.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("paywall", ".paywall"), ("email", ".newsletter"), ("email", ".signup")]
        );
    }

    #[test]
    fn test_errors_carry_pattern() {
        let categories = vec![CategoryDefinitions::new(
            "ads",
            json!({ "example.com": { "if $(.a) nope(1)": { ".modal": "remove" } } }),
        )];
        let err = compile_definitions(&categories, &Registry::default()).unwrap_err();
        assert_eq!(err.to_string(), "Function does not exist: nope in example.com");
        assert_eq!(
            err.root(),
            &DefinitionError::Tokenize(TokenizeError::UnknownFunction("nope".to_string()))
        );
    }

    #[test]
    fn test_empty_guard_fails_compilation() {
        let categories = vec![CategoryDefinitions::new("ads", json!({ "example.com": { "if ": {} } }))];
        let err = compile_definitions(&categories, &Registry::default()).unwrap_err();
        assert_eq!(err.root(), &DefinitionError::InvalidCondition("if ".to_string()));
        assert_eq!(err.to_string(), "Invalid condition: if  in example.com");
    }

    #[test]
    fn test_invalid_pattern_fails_compilation() {
        let categories = vec![CategoryDefinitions::new("ads", json!({ "localhost": { ".a": "remove" } }))];
        let err = compile_definitions(&categories, &Registry::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid URL pattern: localhost in localhost");
    }

    #[test]
    fn test_failed_category_adds_nothing() {
        let registry = Registry::default();
        let mut builder = RuleSetBuilder::new(&registry);
        builder
            .add_category("offer", &json!({ "example.org": { ".promo": "remove" } }))
            .unwrap();

        let bad = json!({ "example.net": { ".a": "remove" }, "example.org": { ".b": "explode" } });
        assert!(builder.add_category("email", &bad).is_err());
        assert_eq!(builder.pattern_count(), 1);

        let entries = builder.build();
        assert_eq!(entries[0].rules.len(), 1);
    }

    #[test]
    fn test_definitions_must_be_object() {
        let registry = Registry::default();
        let mut builder = RuleSetBuilder::new(&registry);
        let err = builder.add_category("ads", &json!([1, 2])).unwrap_err();
        assert_eq!(err, DefinitionError::InvalidDefinitions("[1,2]".to_string()));
        assert!(CategoryDefinitions::from_overlay(&json!("x")).is_err());
    }
}
