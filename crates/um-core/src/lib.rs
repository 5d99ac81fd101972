//! unmodal Core Library
//!
//! This crate provides the runtime half of the unmodal content suppressor:
//! compiled site patterns, the rule index queried per page URL, and the
//! execution loop that applies remediation actions to a live page.
//!
//! # Architecture
//!
//! Rules arrive pre-validated from `um-compiler`. Every predicate and action a
//! rule references is already resolved to a [`PredicateKind`] or
//! [`ActionKind`], so a pass never looks anything up by name. The page itself
//! is reached only through capability traits: [`Document`] for the element
//! tree, [`PageBridge`] for page-global state and [`Timer`] for delays.
//!
//! # Modules
//!
//! - `pattern`: site pattern compilation and URL matching
//! - `url`: allocation-free URL slicing helpers
//! - `registry`: predicate and action capability maps
//! - `types`: rules, guard conditions, actions and compiled pattern entries
//! - `index`: per-URL rule selection
//! - `dom`: the document capability and selector validation
//! - `html`: a `Document` over parsed HTML
//! - `bridge`: page-context request/response channel
//! - `engine`: the execution loop
//! - `scheduler`: debounced re-evaluation on structural changes
//! - `report`: per-page counts and reporting sinks
//! - `config`: user-facing settings

pub mod bridge;
pub mod config;
pub mod dom;
pub mod engine;
pub mod html;
pub mod index;
pub mod pattern;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use bridge::{channel, BridgeClient, BridgeEndpoint, BridgeError, BridgeRequest, BridgeResponse, PageBridge, PageScope};
pub use config::Settings;
pub use dom::{Document, DomError, CALL_SELECTOR};
pub use engine::{Engine, EvaluationError, Page, PassSummary, Timer};
pub use html::HtmlDocument;
pub use index::RuleIndex;
pub use pattern::{InvalidPatternError, SitePattern};
pub use registry::{ActionKind, PredicateKind, Registry};
pub use report::{BlockedCounts, MemoryStore, Reporter, StoreReporter, TallyStore};
pub use scheduler::{MutationBatch, Origin, Scheduler};
pub use types::{ActionSpec, CompiledPatternEntry, Condition, Rule};
