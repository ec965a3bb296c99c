use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use recall_core::{DispatchMismatchError, ToolCall, ToolInvocation, ToolResult};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Runs synchronously on the dispatch path; spawn anything slow.
pub type ToolHandler = Arc<dyn Fn(&ToolInvocation) -> Result<Value, String> + Send + Sync>;

/// Delivers a finished batch. Returns false if it could not be sent.
pub type ToolResponder = Arc<dyn Fn(Vec<ToolResult>) -> bool + Send + Sync>;

pub struct ToolCallDispatcher {
    handlers: Mutex<HashMap<String, ToolHandler>>,
    reply_delay: Duration,
    cancel: Mutex<CancellationToken>,
    pending: Arc<AtomicUsize>,
}

impl ToolCallDispatcher {
    pub fn new(reply_delay: Duration) -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            reply_delay,
            cancel: Mutex::new(CancellationToken::new()),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reply_delay(&self) -> Duration {
        self.reply_delay
    }

    /// Returns true if a handler for `name` was replaced.
    pub fn register(&self, name: impl Into<String>, handler: ToolHandler) -> bool {
        self.handlers.lock().insert(name.into(), handler).is_some()
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.lock().remove(name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.lock().contains_key(name)
    }

    /// Runs every invocation of the batch and returns one result per
    /// distinct id, in invocation order.
    pub fn resolve(&self, call: &ToolCall) -> Vec<ToolResult> {
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(call.function_calls.len());

        for invocation in &call.function_calls {
            if !seen.insert(invocation.id.as_str()) {
                log::warn!("Duplicate tool call id {} ignored", invocation.id);
                continue;
            }

            let handler = self.handlers.lock().get(&invocation.name).cloned();
            let result = match handler {
                Some(handler) => match handler(invocation) {
                    Ok(output) => ToolResult::success(&invocation.id, output),
                    Err(e) => {
                        log::warn!("Tool {} failed: {e}", invocation.name);
                        ToolResult::failure(&invocation.id, e)
                    }
                },
                None => {
                    let err = DispatchMismatchError {
                        name: invocation.name.clone(),
                    };
                    log::warn!("{err}");
                    ToolResult::failure(&invocation.id, err.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    /// Resolves `call` now and hands the results to `responder` after the
    /// reply delay, unless [`ToolCallDispatcher::cancel_pending`] runs first.
    pub fn dispatch(&self, call: &ToolCall, responder: ToolResponder) {
        if call.function_calls.is_empty() {
            return;
        }
        let results = self.resolve(call);
        let token = self.cancel.lock().child_token();
        spawn_reply(
            results,
            responder,
            self.reply_delay,
            token,
            self.pending.clone(),
        );
    }

    /// Drops every scheduled reply that has not been sent yet.
    pub fn cancel_pending(&self) {
        let previous = std::mem::take(&mut *self.cancel.lock());
        previous.cancel();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

fn spawn_reply(
    results: Vec<ToolResult>,
    responder: ToolResponder,
    delay: Duration,
    token: CancellationToken,
    pending: Arc<AtomicUsize>,
) {
    pending.fetch_add(1, Ordering::AcqRel);
    tokio::spawn(async move {
        let fire = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        };
        pending.fetch_sub(1, Ordering::AcqRel);

        if !fire {
            log::debug!("Tool reply for {} calls cancelled", results.len());
            return;
        }
        let count = results.len();
        if responder(results) {
            log::debug!("Sent {count} tool results");
        } else {
            log::warn!("Could not send {count} tool results: session not open");
        }
    });
}
