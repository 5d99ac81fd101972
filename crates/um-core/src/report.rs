//! Completion counts and reporting sinks
//!
//! The engine keeps a per-page [`BlockedCounts`] and notifies a [`Reporter`]
//! once per completed rule. Cross-session totals belong to the host; the
//! [`TallyStore`] trait is the seam it plugs its storage into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::EvaluationError;

// =============================================================================
// Counts
// =============================================================================

/// Category → number of completed rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockedCounts(BTreeMap<String, u32>);

impl BlockedCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: &str) -> u32 {
        self.0.get(category).copied().unwrap_or(0)
    }

    /// Add one to a category and return its new count.
    pub fn increment(&mut self, category: &str) -> u32 {
        let count = self.0.entry(category.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Sum across all categories.
    pub fn total(&self) -> u32 {
        self.0.values().fold(0u32, |sum, v| sum.saturating_add(*v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Sink for engine outcomes.
pub trait Reporter {
    /// A rule of `category` completed; `page_total` is the new sum of all
    /// categories on this page.
    fn completed(&mut self, category: &str, page_total: u32);

    /// A pass was aborted.
    fn failed(&mut self, _error: &EvaluationError) {}
}

impl Reporter for () {
    fn completed(&mut self, _category: &str, _page_total: u32) {}
}

// =============================================================================
// Tally Storage
// =============================================================================

/// Error raised by a tally store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read tally: {0}")]
    Read(String),
    #[error("Failed to write tally: {0}")]
    Write(String),
}

/// Persistent all-time totals.
pub trait TallyStore {
    fn load(&self) -> Result<BlockedCounts, StoreError>;
    fn persist(&mut self, counts: &BlockedCounts) -> Result<(), StoreError>;
}

/// Tally kept in memory for the lifetime of the value.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    counts: BlockedCounts,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> &BlockedCounts {
        &self.counts
    }
}

impl TallyStore for MemoryStore {
    fn load(&self) -> Result<BlockedCounts, StoreError> {
        Ok(self.counts.clone())
    }

    fn persist(&mut self, counts: &BlockedCounts) -> Result<(), StoreError> {
        self.counts = counts.clone();
        Ok(())
    }
}

/// Reporter that tracks the badge value and accumulates all-time totals.
#[derive(Debug)]
pub struct StoreReporter<S> {
    store: S,
    badge: u32,
    failures: usize,
}

impl<S: TallyStore> StoreReporter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            badge: 0,
            failures: 0,
        }
    }

    /// Last page total reported, shown on the toolbar badge.
    pub fn badge(&self) -> u32 {
        self.badge
    }

    /// Number of aborted passes seen.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn accumulate(&mut self, category: &str) -> Result<(), StoreError> {
        let mut totals = self.store.load()?;
        totals.increment(category);
        self.store.persist(&totals)
    }
}

impl<S: TallyStore> Reporter for StoreReporter<S> {
    fn completed(&mut self, category: &str, page_total: u32) {
        self.badge = page_total;
        if let Err(e) = self.accumulate(category) {
            log::warn!("all-time tally not updated for {}: {}", category, e);
        }
    }

    fn failed(&mut self, error: &EvaluationError) {
        self.failures += 1;
        log::debug!("pass failure reported: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_increment_and_total() {
        let mut counts = BlockedCounts::new();
        assert!(counts.is_empty());
        assert_eq!(counts.increment("paywall"), 1);
        assert_eq!(counts.increment("paywall"), 2);
        assert_eq!(counts.increment("consent"), 1);
        assert_eq!(counts.get("paywall"), 2);
        assert_eq!(counts.get("offer"), 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_counts_serialize_as_map() {
        let mut counts = BlockedCounts::new();
        counts.increment("email");
        assert_eq!(serde_json::to_string(&counts).unwrap(), r#"{"email":1}"#);
        let back: BlockedCounts = serde_json::from_str(r#"{"email":4,"offer":2}"#).unwrap();
        assert_eq!(back.total(), 6);
    }

    #[test]
    fn test_store_reporter_accumulates() {
        let mut reporter = StoreReporter::new(MemoryStore::new());
        reporter.completed("paywall", 1);
        reporter.completed("consent", 2);
        reporter.completed("paywall", 3);
        assert_eq!(reporter.badge(), 3);
        let totals = reporter.store().counts();
        assert_eq!(totals.get("paywall"), 2);
        assert_eq!(totals.get("consent"), 1);
    }

    #[test]
    fn test_failures_are_counted_by_store_reporter_only() {
        let error = EvaluationError::Action {
            category: "offer".to_string(),
            action: ".promo remove".to_string(),
            message: "stale element".to_string(),
        };
        ().failed(&error);

        let mut reporter = StoreReporter::new(MemoryStore::new());
        reporter.failed(&error);
        reporter.failed(&error);
        assert_eq!(reporter.failures(), 2);
        assert_eq!(reporter.badge(), 0);
    }

    struct FailingStore;

    impl TallyStore for FailingStore {
        fn load(&self) -> Result<BlockedCounts, StoreError> {
            Err(StoreError::Read("unavailable".to_string()))
        }

        fn persist(&mut self, _counts: &BlockedCounts) -> Result<(), StoreError> {
            Err(StoreError::Write("unavailable".to_string()))
        }
    }

    #[test]
    fn test_store_failure_does_not_block_badge() {
        let mut reporter = StoreReporter::new(FailingStore);
        reporter.completed("offer", 1);
        assert_eq!(reporter.badge(), 1);
    }
}
