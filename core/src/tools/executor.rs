use crate::config::ExecutorConfig;
use crate::error::ToolError;
use crate::tools::index::{ResolvedTool, ToolCatalog};
use crate::tools::{Sanitizer, ToolIndex};
use crate::traits::{ToolCall, ToolCallResult};
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Runs tool calls against their owning servers.
///
/// Every call in a batch is its own task with its own deadline. A call that
/// misses the deadline is abandoned, not cancelled: the remote side effect may
/// still happen, but the batch gets a timeout result for it and moves on.
pub struct ToolExecutor {
    index: Arc<ToolIndex>,
    sanitizer: Sanitizer,
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new(index: Arc<ToolIndex>, sanitizer: Sanitizer, config: ExecutorConfig) -> Self {
        Self {
            index,
            sanitizer,
            config,
        }
    }

    pub fn index(&self) -> &Arc<ToolIndex> {
        &self.index
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Resolves `call` against a fresh listing of the user's servers, then
    /// runs it.
    pub async fn execute_one(&self, call: &ToolCall, user_id: &str) -> ToolCallResult {
        let started = Instant::now();
        debug!(call_id = %call.id, tool = %call.name, user_id, "Executing tool call");

        let resolved = self.index.resolve(&call.name, user_id).await;
        self.finish(call, resolved, started).await
    }

    /// One result per call, in request order, once every call has finished or
    /// hit its deadline. Resolution uses a single listing pass for the batch.
    pub async fn execute_all(self: &Arc<Self>, calls: &[ToolCall], user_id: &str) -> Vec<ToolCallResult> {
        match self.index.load_catalog(user_id).await {
            Ok(catalog) => self.execute_all_with(&catalog, calls).await,
            Err(e) => {
                let reason = format!("failed to load tool servers: {e:#}");
                calls
                    .iter()
                    .map(|call| {
                        ToolCallResult::failure(
                            call,
                            ToolError::Configuration {
                                reason: reason.clone(),
                            },
                            Duration::ZERO,
                        )
                    })
                    .collect()
            }
        }
    }

    /// Runs a batch against an already loaded catalog. Each call's deadline
    /// starts once it has been resolved, so slow listings never eat into it.
    pub async fn execute_all_with(
        self: &Arc<Self>,
        catalog: &ToolCatalog,
        calls: &[ToolCall],
    ) -> Vec<ToolCallResult> {
        let deadline = self.config.call_timeout();

        let units = calls.iter().map(|call| {
            let started = Instant::now();
            let resolved = catalog.resolve(&call.name);
            let task = tokio::spawn({
                let executor = Arc::clone(self);
                let call = call.clone();
                async move { executor.finish(&call, resolved, started).await }
            });

            async move {
                match tokio::time::timeout(deadline, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        let reason = if e.is_panic() {
                            panic_message(e.into_panic().as_ref())
                        } else {
                            "task was cancelled".to_string()
                        };
                        warn!(call_id = %call.id, tool = %call.name, reason = %reason, "Tool task failed");
                        ToolCallResult::failure(
                            call,
                            ToolError::Execution {
                                name: call.name.clone(),
                                reason,
                            },
                            started.elapsed(),
                        )
                    }
                    Err(_) => {
                        warn!(
                            call_id = %call.id,
                            tool = %call.name,
                            timeout_ms = deadline.as_millis() as u64,
                            "Tool call abandoned at deadline"
                        );
                        ToolCallResult::failure(
                            call,
                            ToolError::Timeout {
                                name: call.name.clone(),
                                timeout: deadline,
                            },
                            started.elapsed(),
                        )
                    }
                }
            }
        });

        join_all(units).await
    }

    async fn finish(
        &self,
        call: &ToolCall,
        resolved: Result<ResolvedTool, ToolError>,
        started: Instant,
    ) -> ToolCallResult {
        let outcome = match resolved {
            Ok(resolved) => self.invoke(call, resolved).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(payload) => ToolCallResult::success(
                call,
                truncate(payload, self.config.max_result_bytes),
                started.elapsed(),
            ),
            Err(e) => ToolCallResult::failure(call, e, started.elapsed()),
        };

        debug!(
            call_id = %call.id,
            tool = %call.name,
            success = result.is_success(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Tool call finished"
        );
        result
    }

    async fn invoke(&self, call: &ToolCall, resolved: ResolvedTool) -> Result<String, ToolError> {
        let arguments = self
            .sanitizer
            .sanitize(&call.arguments, resolved.definition.input_schema.as_ref())
            .map_err(|source| ToolError::InvalidArguments {
                name: call.name.clone(),
                source,
            })?;

        // Re-acquired per call: the breaker may have opened, or the cached
        // connection may have been replaced, since the tool was listed.
        let registry = self.index.registry();
        let connector = registry.acquire(&resolved.server).await?;
        let server_id = resolved.server.id;
        let timeout = self.config.call_timeout();

        let pending = AssertUnwindSafe(connector.call_tool(&call.name, arguments)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, pending).await {
            Err(_) => {
                registry.record_failure(server_id).await;
                return Err(ToolError::Timeout {
                    name: call.name.clone(),
                    timeout,
                });
            }
            Ok(Err(panic)) => Err(panic_message(panic.as_ref())),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Ok(Ok(value))) => classify_output(value),
        };

        match outcome {
            Ok(payload) => {
                registry.record_success(server_id);
                Ok(payload)
            }
            Err(reason) => {
                registry.record_failure(server_id).await;
                Err(ToolError::Execution {
                    name: call.name.clone(),
                    reason,
                })
            }
        }
    }
}

/// Normalizes the result shapes tool servers return into a payload or an
/// error message.
pub fn classify_output(value: Value) -> Result<String, String> {
    match value {
        Value::Object(map) => classify_object(map),
        Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

fn classify_object(mut map: Map<String, Value>) -> Result<String, String> {
    let flagged = ["isError", "is_error"]
        .iter()
        .any(|key| map.get(*key).and_then(Value::as_bool) == Some(true));
    if flagged {
        let message = map
            .get("content")
            .and_then(content_text)
            .filter(|text| !text.is_empty())
            .or_else(|| map.get("error").map(render))
            .unwrap_or_else(|| "tool reported an error".to_string());
        return Err(message);
    }

    match map.get("success").and_then(Value::as_bool) {
        Some(false) => {
            return Err(map
                .get("error")
                .or_else(|| map.get("message"))
                .map(render)
                .unwrap_or_else(|| "tool reported failure".to_string()));
        }
        Some(true) => {
            for key in ["result", "data", "output"] {
                if let Some(payload) = map.remove(key) {
                    return Ok(render(&payload));
                }
            }
        }
        None => {}
    }

    if let Some(text) = map.get("content").and_then(content_text) {
        return Ok(text);
    }

    if map.len() == 1 {
        if let Some(error) = map.get("error").filter(|e| !e.is_null()) {
            return Err(render(error));
        }
    }

    Ok(Value::Object(map).to_string())
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item.get("text").and_then(Value::as_str) {
                    Some(text) => text.to_string(),
                    None => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        _ => None,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Cuts `payload` to at most `max_bytes` on a char boundary and appends a
/// marker with the number of dropped bytes.
pub fn truncate(payload: String, max_bytes: usize) -> String {
    if payload.len() <= max_bytes {
        return payload;
    }

    let mut cut = max_bytes;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = payload.len() - cut;
    format!("{}…[truncated {dropped} bytes]", &payload[..cut])
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("tool panicked: {detail}")
}
