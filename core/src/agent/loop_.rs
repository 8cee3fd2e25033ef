use crate::config::AgentConfig;
use crate::error::LoopError;
use crate::tools::ToolExecutor;
use crate::traits::{ChatMessage, ChatRequest, Provider, ToolCall, ToolCallResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type ToolCallStartHook = Arc<dyn Fn(&ToolCall) + Send + Sync>;
pub type ToolCallEndHook = Arc<dyn Fn(&ToolCallResult) + Send + Sync>;

/// Per-invocation settings. Unset bounds fall back to the loop's defaults.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub user_id: String,
    pub model: String,
    pub max_iterations: Option<usize>,
    pub timeout: Option<Duration>,
    pub on_tool_call_start: Option<ToolCallStartHook>,
    pub on_tool_call_end: Option<ToolCallEndHook>,
}

impl RunOptions {
    pub fn new(user_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_tool_call_start(mut self, hook: impl Fn(&ToolCall) + Send + Sync + 'static) -> Self {
        self.on_tool_call_start = Some(Arc::new(hook));
        self
    }

    pub fn on_tool_call_end(mut self, hook: impl Fn(&ToolCallResult) + Send + Sync + 'static) -> Self {
        self.on_tool_call_end = Some(Arc::new(hook));
        self
    }
}

/// Result of one `run`. A failed run still carries the transcript built so far.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub success: bool,
    pub final_content: Option<String>,
    pub transcript: Vec<ChatMessage>,
    pub tool_calls_made: usize,
    pub iterations_used: usize,
    pub error: Option<LoopError>,
}

struct LoopState {
    transcript: Vec<ChatMessage>,
    iterations: usize,
    tool_calls_made: usize,
}

impl LoopState {
    fn finish(self, final_content: Option<String>) -> LoopOutcome {
        LoopOutcome {
            success: true,
            final_content,
            transcript: self.transcript,
            tool_calls_made: self.tool_calls_made,
            iterations_used: self.iterations,
            error: None,
        }
    }

    fn fail(self, error: LoopError) -> LoopOutcome {
        warn!(
            iterations = self.iterations,
            tool_calls = self.tool_calls_made,
            error = %error,
            "Agent loop terminated"
        );
        LoopOutcome {
            success: false,
            final_content: None,
            transcript: self.transcript,
            tool_calls_made: self.tool_calls_made,
            iterations_used: self.iterations,
            error: Some(error),
        }
    }
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    executor: Arc<ToolExecutor>,
    max_iterations: usize,
    timeout: Duration,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, executor: Arc<ToolExecutor>) -> Self {
        Self::with_config(provider, executor, &AgentConfig::default())
    }

    pub fn with_config(provider: Arc<dyn Provider>, executor: Arc<ToolExecutor>, config: &AgentConfig) -> Self {
        Self {
            provider,
            executor,
            max_iterations: config.max_iterations,
            timeout: config.timeout(),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drives the model until it answers without tool calls or a bound is hit.
    ///
    /// Bounds are checked before every model call, so neither is exceeded by
    /// more than the call already in flight. Tool failures never end the run;
    /// they are fed back to the model as tool output.
    pub async fn run(&self, messages: Vec<ChatMessage>, options: RunOptions) -> LoopOutcome {
        let started = Instant::now();
        let max_iterations = options.max_iterations.unwrap_or(self.max_iterations);
        let timeout = options.timeout.unwrap_or(self.timeout);

        let mut state = LoopState {
            transcript: messages,
            iterations: 0,
            tool_calls_made: 0,
        };

        let catalog = self.executor.index().catalog_for_user(&options.user_id).await;
        if catalog.is_empty() {
            debug!(user_id = %options.user_id, "No tools available, single completion");
            return self.complete_without_tools(state, &options).await;
        }

        let tools = catalog.specs();
        info!(
            user_id = %options.user_id,
            tools = tools.len(),
            max_iterations,
            timeout_ms = timeout.as_millis() as u64,
            "Starting agent loop"
        );

        loop {
            if state.iterations >= max_iterations {
                return state.fail(LoopError::MaxIterations {
                    limit: max_iterations,
                });
            }
            if started.elapsed() >= timeout {
                return state.fail(LoopError::Timeout { limit: timeout });
            }

            let request = ChatRequest {
                messages: &state.transcript,
                tools: Some(&tools),
                model: &options.model,
            };
            let response = match self.provider.chat(request).await {
                Ok(response) => response,
                Err(e) => return state.fail(LoopError::Provider(format!("{e:#}"))),
            };

            if !response.has_tool_calls() {
                let Some(content) = response.content().map(str::to_string) else {
                    return state.fail(LoopError::EmptyResponse);
                };
                state.transcript.push(ChatMessage::assistant(content.clone()));
                info!(
                    iterations = state.iterations,
                    tool_calls = state.tool_calls_made,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Agent loop finished"
                );
                return state.finish(Some(content));
            }

            let calls = response.tool_calls.clone();
            debug!(
                iteration = state.iterations + 1,
                calls = calls.len(),
                "Dispatching tool calls"
            );

            if let Some(hook) = &options.on_tool_call_start {
                for call in &calls {
                    hook(call);
                }
            }
            let results = self.executor.execute_all_with(&catalog, &calls).await;
            if let Some(hook) = &options.on_tool_call_end {
                for result in &results {
                    hook(result);
                }
            }

            state.transcript.push(ChatMessage::assistant_with_tool_calls(
                response.text_or_empty(),
                calls,
            ));
            for result in &results {
                state.transcript.push(ChatMessage::tool_result(
                    result.call_id.clone(),
                    result.tool_name.clone(),
                    result.content(),
                ));
            }

            state.iterations += 1;
            state.tool_calls_made += results.len();
        }
    }

    async fn complete_without_tools(&self, mut state: LoopState, options: &RunOptions) -> LoopOutcome {
        let request = ChatRequest {
            messages: &state.transcript,
            tools: None,
            model: &options.model,
        };

        match self.provider.chat(request).await {
            Ok(response) => {
                let content = response.content().map(str::to_string);
                if let Some(content) = &content {
                    state.transcript.push(ChatMessage::assistant(content.clone()));
                }
                state.finish(content)
            }
            Err(e) => state.fail(LoopError::Provider(format!("{e:#}"))),
        }
    }
}
