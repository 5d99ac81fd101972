//! Core type definitions for unmodal
//!
//! These are the compiled forms produced by `um-compiler` and consumed by
//! the rule index and the execution loop.

use std::fmt;

use crate::dom::CALL_SELECTOR;
use crate::pattern::SitePattern;
use crate::registry::{ActionKind, PredicateKind};

// =============================================================================
// Conditions
// =============================================================================

/// One guard call, e.g. `$(.close-btn)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Name as written by the author
    pub function: String,
    /// Raw argument text between the parentheses
    pub argument: String,
    /// Resolved predicate
    pub kind: PredicateKind,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.function, self.argument)
    }
}

// =============================================================================
// Actions
// =============================================================================

/// One remediation step: apply `kind` to the first element matching
/// `selector`, or run it untargeted under the `call` pseudo-selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub selector: String,
    /// Name as written by the author
    pub function: String,
    pub args: Vec<String>,
    /// Resolved action
    pub kind: ActionKind,
}

impl ActionSpec {
    /// Whether this action runs without resolving a page element.
    pub fn is_untargeted(&self) -> bool {
        self.selector == CALL_SELECTOR
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) on {}", self.function, self.args.join(", "), self.selector)
    }
}

// =============================================================================
// Rules
// =============================================================================

/// A compiled rule: conjunctive guard plus ordered actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    category: String,
    conditions: Vec<Condition>,
    actions: Vec<ActionSpec>,
    completed: bool,
}

impl Rule {
    pub fn new(category: &str, conditions: Vec<Condition>, actions: Vec<ActionSpec>) -> Self {
        Self {
            category: category.to_string(),
            conditions,
            actions,
            completed: false,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Guard calls; empty means unconditionally eligible.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn actions(&self) -> &[ActionSpec] {
        &self.actions
    }

    /// Whether this rule has already produced a successful action.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Latch the rule. Returns false if it was already completed.
    pub(crate) fn mark_completed(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        true
    }
}

// =============================================================================
// Compiled Pattern Entries
// =============================================================================

/// All rules sharing one raw site pattern, across categories.
#[derive(Debug, Clone)]
pub struct CompiledPatternEntry {
    pub pattern: SitePattern,
    pub rules: Vec<Rule>,
}

impl CompiledPatternEntry {
    pub fn new(pattern: SitePattern) -> Self {
        Self {
            pattern,
            rules: Vec::new(),
        }
    }
}
