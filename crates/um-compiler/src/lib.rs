//! unmodal Definition Compiler
//!
//! This crate turns raw per-category site definitions (decoded JSON) into the
//! validated, typed rule set consumed by `um-core`.

pub mod builder;
pub mod error;
pub mod expr;
pub mod parser;

pub use builder::{compile_definitions, CategoryDefinitions, RuleSetBuilder};
pub use error::{DefinitionError, TokenizeError};
pub use expr::{tokenize, Token};
pub use parser::parse_body;
