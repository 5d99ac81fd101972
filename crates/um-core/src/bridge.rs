//! Page-context bridge
//!
//! Some guards and actions need page-global state (`window.app.paywall`)
//! rather than the element tree. They reach it through an asynchronous
//! request/response channel: every request carries a correlation id, and
//! exactly one response resolves exactly one waiting caller. A waiter is
//! dropped as soon as its response arrives.
//!
//! [`channel`] builds an in-process pair: the [`BridgeClient`] used by the
//! engine and the [`BridgeEndpoint`] served on the page side, usually by a
//! [`PageScope`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::dom::unquote;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub function: String,
    pub args: Vec<String>,
    pub correlation_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub correlation_id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn ok(correlation_id: u64, result: Value) -> Self {
        Self {
            correlation_id,
            result,
            error: None,
        }
    }

    pub fn err(correlation_id: u64, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Result of `function`, or its error message as [`BridgeError::Remote`].
    pub fn into_result(self, function: &str) -> Result<Value, BridgeError> {
        match self.error {
            Some(message) => Err(BridgeError::Remote {
                function: function.to_string(),
                message,
            }),
            None => Ok(self.result),
        }
    }
}

/// Error raised by a bridge call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("Page bridge disconnected")]
    Disconnected,
    #[error("No pending request for correlation id {0}")]
    UnknownCorrelation(u64),
    #[error("Page function {function} failed: {message}")]
    Remote { function: String, message: String },
}

/// Capability to run a named operation in the page's own context.
pub trait PageBridge {
    fn call(&self, function: &str, args: &[String]) -> impl Future<Output = Result<Value, BridgeError>>;
}

// =============================================================================
// Channel
// =============================================================================

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeResponse>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<BridgeResponse>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a connected client/endpoint pair.
pub fn channel() -> (BridgeClient, BridgeEndpoint) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

    let client = BridgeClient {
        requests: tx,
        pending: Arc::clone(&pending),
        next_id: AtomicU64::new(1),
    };
    let endpoint = BridgeEndpoint {
        requests: rx,
        pending,
    };

    (client, endpoint)
}

/// Engine side of the bridge.
#[derive(Debug)]
pub struct BridgeClient {
    requests: mpsc::UnboundedSender<BridgeRequest>,
    pending: Pending,
    next_id: AtomicU64,
}

impl BridgeClient {
    /// Requests sent but not yet answered.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl PageBridge for BridgeClient {
    async fn call(&self, function: &str, args: &[String]) -> Result<Value, BridgeError> {
        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(correlation_id, tx);
        let _waiter = WaiterGuard {
            pending: &self.pending,
            correlation_id,
        };

        let request = BridgeRequest {
            function: function.to_string(),
            args: args.to_vec(),
            correlation_id,
        };
        if self.requests.send(request).is_err() {
            return Err(BridgeError::Disconnected);
        }

        let response = rx.await.map_err(|_| BridgeError::Disconnected)?;
        response.into_result(function)
    }
}

/// Drops the waiter for a call when the call ends, answered or abandoned.
struct WaiterGuard<'a> {
    pending: &'a Pending,
    correlation_id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.correlation_id);
    }
}

/// Page side of the bridge.
#[derive(Debug)]
pub struct BridgeEndpoint {
    requests: mpsc::UnboundedReceiver<BridgeRequest>,
    pending: Pending,
}

impl BridgeEndpoint {
    /// Next request from the engine, or None once the client is gone.
    pub async fn recv(&mut self) -> Option<BridgeRequest> {
        self.requests.recv().await
    }

    /// Deliver a response to the caller waiting on its correlation id.
    pub fn respond(&self, response: BridgeResponse) -> Result<(), BridgeError> {
        let correlation_id = response.correlation_id;
        let waiter = lock(&self.pending)
            .remove(&correlation_id)
            .ok_or(BridgeError::UnknownCorrelation(correlation_id))?;
        waiter.send(response).map_err(|_| BridgeError::Disconnected)
    }

    /// Answer requests from `scope` until the client disconnects.
    pub async fn serve(mut self, mut scope: PageScope) {
        while let Some(request) = self.recv().await {
            let response = scope.handle(&request);
            if let Err(e) = self.respond(response) {
                log::warn!("bridge response for {} dropped: {}", request.function, e);
            }
        }
    }
}

impl Drop for BridgeEndpoint {
    fn drop(&mut self) {
        // Wake every waiter with a disconnect instead of leaving it hanging.
        lock(&self.pending).clear();
    }
}

// =============================================================================
// Page Scope
// =============================================================================

type PageFunction = Box<dyn FnMut(&[String]) -> Result<Value, String> + Send>;

/// Page globals as seen from the page's own context.
///
/// Understands two operations: `defined(path)` and `call(path, ...args)`.
pub struct PageScope {
    globals: Value,
    functions: HashMap<String, PageFunction>,
}

impl PageScope {
    pub fn new(globals: Value) -> Self {
        Self {
            globals,
            functions: HashMap::new(),
        }
    }

    /// Register a callable at a dot path.
    pub fn define_function<F>(&mut self, path: &str, function: F)
    where
        F: FnMut(&[String]) -> Result<Value, String> + Send + 'static,
    {
        self.functions.insert(path.to_string(), Box::new(function));
    }

    /// Walk a dot path through own properties of the globals.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let path = unquote(path);
        if path.is_empty() {
            return None;
        }
        path.split('.').try_fold(&self.globals, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// A present `null` counts as defined; only absence does not.
    pub fn is_defined(&self, path: &str) -> bool {
        self.functions.contains_key(unquote(path)) || self.resolve(path).is_some()
    }

    /// Answer one request.
    pub fn handle(&mut self, request: &BridgeRequest) -> BridgeResponse {
        let id = request.correlation_id;
        match request.function.as_str() {
            "defined" => match request.args.first() {
                Some(path) => BridgeResponse::ok(id, Value::Bool(self.is_defined(path))),
                None => BridgeResponse::err(id, "defined() needs a path"),
            },
            "call" => {
                let Some((path, args)) = request.args.split_first() else {
                    return BridgeResponse::err(id, "call() needs a path");
                };
                match self.functions.get_mut(unquote(path)) {
                    Some(function) => match function(args) {
                        Ok(result) => BridgeResponse::ok(id, result),
                        Err(message) => BridgeResponse::err(id, message),
                    },
                    None => BridgeResponse::err(id, format!("{path} is not a function")),
                }
            }
            other => BridgeResponse::err(id, format!("Unknown page function: {other}")),
        }
    }
}
