//! Rule Index
//!
//! Selects the compiled rules that apply to a page URL. Selection is pure:
//! the same URL always yields the same rules in the same order, entry order
//! first and rule order within an entry second.

use std::collections::HashSet;

use crate::config::Settings;
use crate::types::{CompiledPatternEntry, Rule};

/// Every rule whose entry pattern accepts `url`, in entry then rule order.
pub fn select<'a>(entries: &'a [CompiledPatternEntry], url: &str) -> impl Iterator<Item = &'a Rule> + 'a {
    let url = url.to_string();
    entries
        .iter()
        .filter(move |entry| entry.pattern.matches(&url))
        .flat_map(|entry| entry.rules.iter())
}

/// Compiled rule set plus the user's category switches.
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    entries: Vec<CompiledPatternEntry>,
    disabled_categories: HashSet<String>,
}

impl RuleIndex {
    /// Create an index over compiled entries with every category enabled.
    pub fn new(entries: Vec<CompiledPatternEntry>) -> Self {
        Self {
            entries,
            disabled_categories: HashSet::new(),
        }
    }

    /// Create an index honoring the category switches in `settings`.
    pub fn with_settings(entries: Vec<CompiledPatternEntry>, settings: &Settings) -> Self {
        let mut index = Self::new(entries);
        for (category, enabled) in &settings.enabled_categories {
            if !enabled {
                index.disable_category(category);
            }
        }
        index
    }

    /// Stop selecting rules of a category.
    pub fn disable_category(&mut self, category: &str) {
        self.disabled_categories.insert(category.to_string());
    }

    pub fn enable_category(&mut self, category: &str) {
        self.disabled_categories.remove(category);
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        !self.disabled_categories.contains(category)
    }

    pub fn entries(&self) -> &[CompiledPatternEntry] {
        &self.entries
    }

    pub fn pattern_count(&self) -> usize {
        self.entries.len()
    }

    pub fn rule_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.rules.len()).sum()
    }

    /// Fresh copies of the rules that apply to `url`, with their completion
    /// latches unset.
    pub fn select(&self, url: &str) -> Vec<Rule> {
        select(&self.entries, url)
            .filter(|rule| self.is_enabled(rule.category()))
            .cloned()
            .collect()
    }
}
