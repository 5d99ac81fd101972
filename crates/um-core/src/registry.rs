//! Predicate and action registries
//!
//! Guard predicates and remediation actions form closed sets. A [`Registry`]
//! maps the names authors write in definitions onto those kinds; it is built
//! once, optionally narrowed or extended, and handed to the compiler. After
//! compilation every rule carries resolved kinds, so evaluation never looks
//! a name up again.

use std::collections::HashMap;
use std::fmt;

use crate::dom::{unquote, validate_selector};

// =============================================================================
// Predicates
// =============================================================================

/// Guard predicate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    /// `$(selector)`: an element matching the selector exists
    Exists,
    /// `defined(path)`: a page global resolves at the dot path
    Defined,
    /// `sleep(ms)`: wait, then succeed
    Sleep,
}

impl PredicateKind {
    /// Validate-only mode: check the argument without touching any page.
    pub fn validate(self, argument: &str) -> Result<(), String> {
        match self {
            Self::Exists => validate_selector(unquote(argument)).map_err(|e| e.to_string()),
            Self::Defined => parse_global_path(argument).map(|_| ()),
            Self::Sleep => parse_sleep_ms(argument).map(|_| ()),
        }
    }

    /// Name the predicate is registered under by default.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Exists => "$",
            Self::Defined => "defined",
            Self::Sleep => "sleep",
        }
    }
}

/// Split a dot path such as `app.modal.close` into its segments.
pub fn parse_global_path(argument: &str) -> Result<Vec<&str>, String> {
    let path = unquote(argument);
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(format!("Invalid global path: {argument}"));
    }
    Ok(segments)
}

pub(crate) fn parse_sleep_ms(argument: &str) -> Result<u64, String> {
    unquote(argument)
        .parse::<u64>()
        .map_err(|_| format!("Invalid duration: {argument}"))
}

// =============================================================================
// Actions
// =============================================================================

/// Remediation action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Remove,
    AddClass,
    /// A first argument of `*` clears every class
    RemoveClass,
    AddStyle,
    RemoveStyle,
    /// Invoke a page-global function through the page-context bridge
    Call,
}

impl ActionKind {
    /// Whether the action operates on a resolved element.
    pub fn needs_target(self) -> bool {
        !matches!(self, Self::Call)
    }

    /// Name the action is registered under by default.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::AddClass => "addClass",
            Self::RemoveClass => "removeClass",
            Self::AddStyle => "addStyle",
            Self::RemoveStyle => "removeStyle",
            Self::Call => "call",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

// =============================================================================
// Registry
// =============================================================================

const BUILTIN_PREDICATES: [PredicateKind; 3] =
    [PredicateKind::Exists, PredicateKind::Defined, PredicateKind::Sleep];

const BUILTIN_ACTIONS: [ActionKind; 6] = [
    ActionKind::Remove,
    ActionKind::AddClass,
    ActionKind::RemoveClass,
    ActionKind::AddStyle,
    ActionKind::RemoveStyle,
    ActionKind::Call,
];

/// Name → kind capability maps consumed by the compiler.
#[derive(Debug, Clone)]
pub struct Registry {
    predicates: HashMap<String, PredicateKind>,
    actions: HashMap<String, ActionKind>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in BUILTIN_PREDICATES {
            registry.predicates.insert(kind.default_name().to_string(), kind);
        }
        for kind in BUILTIN_ACTIONS {
            registry.actions.insert(kind.default_name().to_string(), kind);
        }
        registry
    }
}

impl Registry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
            actions: HashMap::new(),
        }
    }

    pub fn with_predicate(mut self, name: &str, kind: PredicateKind) -> Self {
        self.predicates.insert(name.to_string(), kind);
        self
    }

    pub fn without_predicate(mut self, name: &str) -> Self {
        self.predicates.remove(name);
        self
    }

    pub fn with_action(mut self, name: &str, kind: ActionKind) -> Self {
        self.actions.insert(name.to_string(), kind);
        self
    }

    pub fn without_action(mut self, name: &str) -> Self {
        self.actions.remove(name);
        self
    }

    pub fn predicate(&self, name: &str) -> Option<PredicateKind> {
        self.predicates.get(name).copied()
    }

    pub fn action(&self, name: &str) -> Option<ActionKind> {
        self.actions.get(name).copied()
    }
}
