//! Execution loop
//!
//! An [`Engine`] owns the rules selected for one page. Each pass walks the
//! pending rules in order: the guard is evaluated left to right and stops at
//! the first false predicate, then every action of an eligible rule is
//! attempted. A rule completes the first time any of its actions succeeds
//! and is never evaluated again on that page.
//!
//! Passes are sequential. The first error aborts the pass and is both
//! returned to the caller and forwarded to the [`Reporter`].

use std::future::Future;
use std::time::Duration;

use crate::bridge::PageBridge;
use crate::dom::{unquote, Document};
use crate::registry::{parse_sleep_ms, ActionKind, PredicateKind};
use crate::report::{BlockedCounts, Reporter};
use crate::types::{ActionSpec, Condition, Rule};

/// Async delay capability used by `sleep(ms)`.
pub trait Timer {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()>;
}

/// Capabilities of the page a pass runs against.
pub struct Page<D, B, T> {
    pub document: D,
    pub bridge: B,
    pub timer: T,
}

impl<D, B, T> Page<D, B, T> {
    pub fn new(document: D, bridge: B, timer: T) -> Self {
        Self { document, bridge, timer }
    }
}

/// Error that aborts an evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("{category}: guard {condition} failed: {message}")]
    Predicate {
        category: String,
        condition: String,
        message: String,
    },
    #[error("{category}: action {action} failed: {message}")]
    Action {
        category: String,
        action: String,
        message: String,
    },
}

impl EvaluationError {
    fn predicate(rule: &Rule, condition: &Condition, message: impl Into<String>) -> Self {
        Self::Predicate {
            category: rule.category().to_string(),
            condition: condition.to_string(),
            message: message.into(),
        }
    }

    fn action(rule: &Rule, action: &ActionSpec, message: impl Into<String>) -> Self {
        Self::Action {
            category: rule.category().to_string(),
            action: action.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Pending rules visited
    pub evaluated: usize,
    /// Rules that completed during this pass
    pub completed: usize,
    /// Rules still pending afterwards
    pub pending: usize,
}

struct ActionOutcome {
    succeeded: bool,
    error: Option<EvaluationError>,
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    rules: Vec<Rule>,
    counts: BlockedCounts,
}

impl Engine {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            counts: BlockedCounts::new(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Per-category completions on this page.
    pub fn blocked_counts(&self) -> &BlockedCounts {
        &self.counts
    }

    /// Rules not yet completed.
    pub fn pending(&self) -> usize {
        self.rules.iter().filter(|r| !r.is_completed()).count()
    }

    pub fn is_finished(&self) -> bool {
        self.pending() == 0
    }

    /// Run one evaluation pass.
    pub async fn evaluate<D, B, T, R>(
        &mut self,
        page: &mut Page<D, B, T>,
        reporter: &mut R,
    ) -> Result<PassSummary, EvaluationError>
    where
        D: Document,
        B: PageBridge,
        T: Timer,
        R: Reporter,
    {
        match self.run_pass(page, reporter).await {
            Ok(summary) => {
                log::debug!(
                    "pass finished: {} evaluated, {} completed, {} pending",
                    summary.evaluated,
                    summary.completed,
                    summary.pending
                );
                Ok(summary)
            }
            Err(error) => {
                log::error!("evaluation pass aborted: {}", error);
                reporter.failed(&error);
                Err(error)
            }
        }
    }

    async fn run_pass<D, B, T, R>(
        &mut self,
        page: &mut Page<D, B, T>,
        reporter: &mut R,
    ) -> Result<PassSummary, EvaluationError>
    where
        D: Document,
        B: PageBridge,
        T: Timer,
        R: Reporter,
    {
        let mut summary = PassSummary::default();

        for index in 0..self.rules.len() {
            if self.rules[index].is_completed() {
                continue;
            }
            summary.evaluated += 1;

            if !is_eligible(&self.rules[index], page).await? {
                continue;
            }

            let outcome = run_actions(&self.rules[index], page).await;
            if outcome.succeeded && self.complete(index, reporter) {
                summary.completed += 1;
            }
            if let Some(error) = outcome.error {
                return Err(error);
            }
        }

        summary.pending = self.pending();
        Ok(summary)
    }

    fn complete<R: Reporter>(&mut self, index: usize, reporter: &mut R) -> bool {
        let rule = &mut self.rules[index];
        if !rule.mark_completed() {
            return false;
        }
        let category = rule.category().to_string();
        self.counts.increment(&category);
        let total = self.counts.total();
        log::info!("rule completed: {} (page total {})", category, total);
        reporter.completed(&category, total);
        true
    }
}

// =============================================================================
// Guards
// =============================================================================

async fn is_eligible<D, B, T>(rule: &Rule, page: &Page<D, B, T>) -> Result<bool, EvaluationError>
where
    D: Document,
    B: PageBridge,
    T: Timer,
{
    for condition in rule.conditions() {
        if !check(rule, condition, page).await? {
            log::trace!("guard {} is false", condition);
            return Ok(false);
        }
    }
    Ok(true)
}

async fn check<D, B, T>(rule: &Rule, condition: &Condition, page: &Page<D, B, T>) -> Result<bool, EvaluationError>
where
    D: Document,
    B: PageBridge,
    T: Timer,
{
    let argument = unquote(&condition.argument);
    match condition.kind {
        PredicateKind::Exists => page
            .document
            .query_selector(argument)
            .map(|found| found.is_some())
            .map_err(|e| EvaluationError::predicate(rule, condition, e.to_string())),
        PredicateKind::Defined => {
            let args = [argument.to_string()];
            let value = page
                .bridge
                .call("defined", &args)
                .await
                .map_err(|e| EvaluationError::predicate(rule, condition, e.to_string()))?;
            value.as_bool().ok_or_else(|| {
                EvaluationError::predicate(rule, condition, format!("expected a boolean, got {value}"))
            })
        }
        PredicateKind::Sleep => {
            let ms = parse_sleep_ms(argument).map_err(|e| EvaluationError::predicate(rule, condition, e))?;
            page.timer.sleep(Duration::from_millis(ms)).await;
            Ok(true)
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

async fn run_actions<D, B, T>(rule: &Rule, page: &mut Page<D, B, T>) -> ActionOutcome
where
    D: Document,
    B: PageBridge,
    T: Timer,
{
    let mut succeeded = false;
    for action in rule.actions() {
        match run_action(rule, action, page).await {
            Ok(true) => succeeded = true,
            Ok(false) => {}
            Err(error) => {
                return ActionOutcome {
                    succeeded,
                    error: Some(error),
                }
            }
        }
    }
    ActionOutcome { succeeded, error: None }
}

/// Returns false when the target selector matched nothing.
async fn run_action<D, B, T>(rule: &Rule, action: &ActionSpec, page: &mut Page<D, B, T>) -> Result<bool, EvaluationError>
where
    D: Document,
    B: PageBridge,
    T: Timer,
{
    let fail = |message: String| EvaluationError::action(rule, action, message);

    if action.is_untargeted() {
        if action.kind.needs_target() {
            return Err(fail(format!("{} needs an element target", action.kind)));
        }
        log::debug!("action: {}", action);
        call_page(action, page).await.map_err(fail)?;
        return Ok(true);
    }

    let Some(target) = page.document.query_selector(&action.selector).map_err(|e| fail(e.to_string()))? else {
        return Ok(false);
    };
    log::debug!("action: {}", action);

    let args: Vec<&str> = action.args.iter().map(String::as_str).collect();
    let document = &mut page.document;
    let applied = match action.kind {
        ActionKind::Remove => document.remove(&target),
        ActionKind::AddClass => document.add_classes(&target, &class_names(&args)),
        ActionKind::RemoveClass if args.first() == Some(&"*") => document.clear_classes(&target),
        ActionKind::RemoveClass => document.remove_classes(&target, &class_names(&args)),
        ActionKind::AddStyle => match args.first() {
            Some(declaration) => document.append_style(&target, declaration),
            None => Ok(()),
        },
        ActionKind::RemoveStyle => document.clear_style(&target),
        ActionKind::Call => {
            call_page(action, page).await.map_err(fail)?;
            return Ok(true);
        }
    };
    applied.map_err(|e| fail(e.to_string()))?;
    Ok(true)
}

/// `call(path, ...args)` through the bridge; the page-side result is discarded.
async fn call_page<D, B, T>(action: &ActionSpec, page: &Page<D, B, T>) -> Result<(), String>
where
    B: PageBridge,
{
    if action.args.is_empty() {
        return Err("call needs a function path".to_string());
    }
    page.bridge
        .call("call", &action.args)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn class_names<'a>(args: &[&'a str]) -> Vec<&'a str> {
    args.iter().flat_map(|arg| arg.split_whitespace()).collect()
}
