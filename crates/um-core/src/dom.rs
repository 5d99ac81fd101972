//! Document capability
//!
//! The engine never owns the page. It reaches the element tree through the
//! [`Document`] trait, implemented over parsed HTML in [`crate::html`] and
//! over the live browser DOM in `um-wasm`.

use scraper::Selector;

/// Pseudo-selector for actions that have no element target.
pub const CALL_SELECTOR: &str = "call";

/// Error raised by a document implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Stale element handle")]
    StaleHandle,
    #[error("{0}")]
    Host(String),
}

/// Access to a page's element tree.
pub trait Document {
    /// Handle to a resolved element.
    type Handle: Clone;

    /// Resolve the first element matching `selector` in document order.
    fn query_selector(&self, selector: &str) -> Result<Option<Self::Handle>, DomError>;

    /// Detach the element from the tree.
    fn remove(&mut self, target: &Self::Handle) -> Result<(), DomError>;

    fn add_classes(&mut self, target: &Self::Handle, classes: &[&str]) -> Result<(), DomError>;

    fn remove_classes(&mut self, target: &Self::Handle, classes: &[&str]) -> Result<(), DomError>;

    fn clear_classes(&mut self, target: &Self::Handle) -> Result<(), DomError>;

    /// Append a declaration to the element's inline style.
    fn append_style(&mut self, target: &Self::Handle, declaration: &str) -> Result<(), DomError>;

    fn clear_style(&mut self, target: &Self::Handle) -> Result<(), DomError>;
}

/// Check that a selector is well formed without touching any page.
pub fn validate_selector(selector: &str) -> Result<(), DomError> {
    parse_selector(selector).map(|_| ())
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, DomError> {
    Selector::parse(selector).map_err(|_| DomError::InvalidSelector(selector.to_string()))
}

/// Inline style with `declaration` appended.
pub fn append_declaration(current: &str, declaration: &str) -> String {
    let current = current.trim().trim_end_matches(';').trim_end();
    if current.is_empty() {
        declaration.to_string()
    } else {
        format!("{current}; {declaration}")
    }
}

/// Strip one pair of enclosing single quotes.
pub(crate) fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}
