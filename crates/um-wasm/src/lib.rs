//! WebAssembly bindings for unmodal
//!
//! Content-script side of the engine: the live DOM through `web-sys`, the
//! page-context bridge through a host-supplied JS function and `sleep`
//! through `setTimeout`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

use um_compiler::{compile_definitions, CategoryDefinitions};
use um_core::url::extract_host;
use um_core::{
    BlockedCounts, BridgeError, BridgeRequest, BridgeResponse, CompiledPatternEntry, Document, DomError, Engine,
    EvaluationError, MutationBatch, Origin, Page, PageBridge, Registry, Reporter, RuleIndex, Scheduler, Settings,
    Timer,
};

/// Attribute marking nodes inserted by the engine itself.
pub const ENGINE_ATTRIBUTE: &str = "data-unmodal";

/// Attribute the host must set on nodes it inserts for the engine (such as
/// the page-context inject script) so their mutations do not schedule a pass.
#[wasm_bindgen(js_name = engineAttribute)]
pub fn engine_attribute() -> String {
    ENGINE_ATTRIBUTE.to_string()
}

// =============================================================================
// Logging
// =============================================================================

struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[unmodal] {}", record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Route engine logs to the browser console.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) {
    // A second call only changes the level.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level.parse().unwrap_or(log::LevelFilter::Info));
}

// =============================================================================
// Compilation
// =============================================================================

fn compile_categories(categories_json: &str) -> Result<Vec<CompiledPatternEntry>, String> {
    let categories: Vec<CategoryDefinitions> =
        serde_json::from_str(categories_json).map_err(|e| format!("Invalid definitions JSON: {e}"))?;
    compile_definitions(&categories, &Registry::default()).map_err(|e| e.to_string())
}

/// Compile `[{ category, definitions }, ...]` and return `{ patterns, rules }`.
#[wasm_bindgen(js_name = validateDefinitions)]
pub fn validate_definitions(categories_json: &str) -> Result<JsValue, JsValue> {
    let index = RuleIndex::new(compile_categories(categories_json).map_err(|e| JsValue::from_str(&e))?);

    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"patterns".into(), &JsValue::from(index.pattern_count() as u32));
    let _ = js_sys::Reflect::set(&result, &"rules".into(), &JsValue::from(index.rule_count() as u32));
    Ok(result.into())
}

// =============================================================================
// Page Capabilities
// =============================================================================

struct WebDocument {
    document: web_sys::Document,
}

fn host_error(error: JsValue) -> DomError {
    DomError::Host(error.as_string().unwrap_or_else(|| format!("{error:?}")))
}

impl Document for WebDocument {
    type Handle = web_sys::Element;

    fn query_selector(&self, selector: &str) -> Result<Option<web_sys::Element>, DomError> {
        self.document
            .query_selector(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))
    }

    fn remove(&mut self, target: &web_sys::Element) -> Result<(), DomError> {
        target.remove();
        Ok(())
    }

    fn add_classes(&mut self, target: &web_sys::Element, classes: &[&str]) -> Result<(), DomError> {
        let list = target.class_list();
        for class in classes {
            list.add_1(class).map_err(host_error)?;
        }
        Ok(())
    }

    fn remove_classes(&mut self, target: &web_sys::Element, classes: &[&str]) -> Result<(), DomError> {
        let list = target.class_list();
        for class in classes {
            list.remove_1(class).map_err(host_error)?;
        }
        Ok(())
    }

    fn clear_classes(&mut self, target: &web_sys::Element) -> Result<(), DomError> {
        target.set_class_name("");
        Ok(())
    }

    fn append_style(&mut self, target: &web_sys::Element, declaration: &str) -> Result<(), DomError> {
        let current = target.get_attribute("style").unwrap_or_default();
        let style = um_core::dom::append_declaration(&current, declaration);
        target.set_attribute("style", &style).map_err(host_error)
    }

    fn clear_style(&mut self, target: &web_sys::Element) -> Result<(), DomError> {
        target.remove_attribute("style").map_err(host_error)
    }
}

/// Bridge over a host function `(requestJson) => Promise<responseJson>`.
struct JsBridge {
    function: js_sys::Function,
    next_id: Cell<u64>,
}

impl JsBridge {
    fn new(function: js_sys::Function) -> Self {
        Self {
            function,
            next_id: Cell::new(1),
        }
    }
}

fn remote(function: &str, message: impl Into<String>) -> BridgeError {
    BridgeError::Remote {
        function: function.to_string(),
        message: message.into(),
    }
}

impl PageBridge for JsBridge {
    async fn call(&self, function: &str, args: &[String]) -> Result<serde_json::Value, BridgeError> {
        let correlation_id = self.next_id.get();
        self.next_id.set(correlation_id + 1);

        let request = BridgeRequest {
            function: function.to_string(),
            args: args.to_vec(),
            correlation_id,
        };
        let payload = serde_json::to_string(&request).map_err(|e| remote(function, e.to_string()))?;

        let returned = self
            .function
            .call1(&JsValue::NULL, &JsValue::from_str(&payload))
            .map_err(|_| BridgeError::Disconnected)?;
        let promise: js_sys::Promise = returned
            .dyn_into()
            .map_err(|_| remote(function, "bridge function must return a Promise"))?;
        let reply = JsFuture::from(promise)
            .await
            .map_err(|e| remote(function, e.as_string().unwrap_or_default()))?;

        let text = reply
            .as_string()
            .ok_or_else(|| remote(function, "bridge response must be a JSON string"))?;
        let response: BridgeResponse = serde_json::from_str(&text).map_err(|e| remote(function, e.to_string()))?;
        if response.correlation_id != correlation_id {
            return Err(BridgeError::UnknownCorrelation(response.correlation_id));
        }
        response.into_result(function)
    }
}

struct JsTimer;

impl Timer for JsTimer {
    async fn sleep(&self, duration: Duration) {
        let ms = duration.as_millis().min(i32::MAX as u128) as i32;
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window()
                .map(|window| window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms).is_ok())
                .unwrap_or(false);
            if !scheduled {
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// Forwards completions to an optional host callback `(category, pageTotal)`.
#[derive(Default)]
struct CallbackReporter {
    on_completed: Option<js_sys::Function>,
}

impl Reporter for CallbackReporter {
    fn completed(&mut self, category: &str, page_total: u32) {
        if let Some(callback) = &self.on_completed {
            let _ = callback.call2(&JsValue::NULL, &JsValue::from_str(category), &JsValue::from(page_total));
        }
    }

    fn failed(&mut self, error: &EvaluationError) {
        log::warn!("pass failed: {}", error);
    }
}

// =============================================================================
// Session
// =============================================================================

type WebPage = Page<WebDocument, JsBridge, JsTimer>;

struct SessionState {
    // Taken out for the duration of a pass.
    engine: Option<Engine>,
    page: Option<WebPage>,
    reporter: CallbackReporter,
    scheduler: Scheduler,
    counts: BlockedCounts,
    pending: usize,
}

/// Engine state for one page.
///
/// `notifyMutations` ignores added nodes carrying the `engineAttribute()`
/// attribute, so the host tags whatever it inserts on the engine's behalf.
#[wasm_bindgen]
pub struct Session {
    state: Rc<RefCell<SessionState>>,
}

#[wasm_bindgen]
impl Session {
    #[wasm_bindgen(constructor)]
    pub fn new(
        categories_json: &str,
        settings_json: &str,
        url: &str,
        bridge_fn: js_sys::Function,
    ) -> Result<Session, JsValue> {
        let settings = Settings::from_json(settings_json).map_err(|e| JsValue::from_str(&format!("Invalid settings: {e}")))?;
        let entries = compile_categories(categories_json).map_err(|e| JsValue::from_str(&e))?;
        let rules = RuleIndex::with_settings(entries, &settings).select(url);
        log::info!("{} rules apply to {}", rules.len(), extract_host(url).unwrap_or(url));

        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("No document available"))?;

        let engine = Engine::new(rules);
        let pending = engine.pending();
        let state = SessionState {
            engine: Some(engine),
            page: Some(Page::new(WebDocument { document }, JsBridge::new(bridge_fn), JsTimer)),
            reporter: CallbackReporter::default(),
            scheduler: Scheduler::new(settings.debounce()),
            counts: BlockedCounts::new(),
            pending,
        };

        Ok(Session {
            state: Rc::new(RefCell::new(state)),
        })
    }

    /// Register `(category, pageTotal) => void`, called once per completed rule.
    #[wasm_bindgen(js_name = onCompleted)]
    pub fn on_completed(&self, callback: js_sys::Function) {
        self.state.borrow_mut().reporter.on_completed = Some(callback);
    }

    /// Run one pass. Resolves to the page total.
    pub fn evaluate(&self) -> js_sys::Promise {
        let state = Rc::clone(&self.state);

        future_to_promise(async move {
            let (mut engine, mut page, mut reporter) = {
                let mut s = state.borrow_mut();
                let (Some(engine), Some(page)) = (s.engine.take(), s.page.take()) else {
                    return Err(JsValue::from_str("A pass is already running"));
                };
                s.scheduler.begin_pass();
                let reporter = std::mem::take(&mut s.reporter);
                (engine, page, reporter)
            };

            let result = engine.evaluate(&mut page, &mut reporter).await;

            let mut s = state.borrow_mut();
            s.counts = engine.blocked_counts().clone();
            s.pending = engine.pending();
            s.engine = Some(engine);
            s.page = Some(page);
            s.reporter = reporter;
            s.scheduler.end_pass();
            let total = s.counts.total();
            drop(s);

            result
                .map(|_| JsValue::from(total))
                .map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }

    /// Feed one mutation batch. Returns true if it re-armed the debounce.
    #[wasm_bindgen(js_name = notifyMutations)]
    pub fn notify_mutations(&self, added_nodes: js_sys::Array, now_ms: f64) -> bool {
        let batch = MutationBatch::new(added_nodes.iter().map(|node| origin_of(&node)).collect());
        self.state.borrow_mut().scheduler.observe(&batch, millis(now_ms))
    }

    /// Whether a debounced pass is due at `nowMs`.
    pub fn poll(&self, now_ms: f64) -> bool {
        self.state.borrow_mut().scheduler.poll(millis(now_ms))
    }

    /// Per-category counts for this page as JSON.
    #[wasm_bindgen(js_name = blockedCounts)]
    pub fn blocked_counts(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.borrow().counts).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = pendingRules)]
    pub fn pending_rules(&self) -> u32 {
        self.state.borrow().pending as u32
    }
}

fn origin_of(node: &JsValue) -> Origin {
    match node.dyn_ref::<web_sys::Element>() {
        Some(element) if element.has_attribute(ENGINE_ATTRIBUTE) => Origin::Engine,
        _ => Origin::External,
    }
}

fn millis(ms: f64) -> Duration {
    Duration::from_millis(ms.max(0.0) as u64)
}
