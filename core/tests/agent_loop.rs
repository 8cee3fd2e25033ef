use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use toolrun_core::{
    AgentLoop, BreakerConfig, ChatMessage, ChatRequest, ChatResponse, ConnectionRegistry, Connector,
    ConnectorBuilder, ConnectorFactory, ExecutorConfig, InMemoryStore, Provider, RunOptions, Sanitizer,
    SanitizerConfig, ToolCall, ToolDefinition, ToolExecutor, ToolIndex, ToolServerConfig,
    TransportConfig, TransportKind,
};

/// Records every call and answers from a fixed function.
struct FakeServer {
    tools: Vec<ToolDefinition>,
    answer: fn(&str, &Value) -> anyhow::Result<Value>,
    calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl Connector for FakeServer {
    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDefinition>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
        (self.answer)(name, &arguments)
    }
}

struct Fixed(Arc<FakeServer>);

#[async_trait]
impl ConnectorBuilder for Fixed {
    async fn build(
        &self,
        _server: &ToolServerConfig,
        _transport: &TransportConfig,
    ) -> anyhow::Result<Arc<dyn Connector>> {
        Ok(self.0.clone())
    }
}

type Step = Box<dyn Fn(&ChatRequest<'_>) -> ChatResponse + Send + Sync>;

fn step(f: impl Fn(&ChatRequest<'_>) -> ChatResponse + Send + Sync + 'static) -> Step {
    Box::new(f)
}

/// Plays one step per model call and keeps a copy of each request.
struct StepProvider {
    steps: Vec<Step>,
    seen: Mutex<Vec<(Vec<ChatMessage>, Vec<String>)>>,
}

#[async_trait]
impl Provider for StepProvider {
    async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
        let mut seen = self.seen.lock().unwrap();
        let step = self
            .steps
            .get(seen.len())
            .ok_or_else(|| anyhow::anyhow!("unexpected model call"))?;
        let tools = request
            .tools
            .unwrap_or_default()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        seen.push((request.messages.to_vec(), tools));
        Ok(step(&request))
    }
}

fn calculator() -> Arc<FakeServer> {
    Arc::new(FakeServer {
        tools: vec![
            ToolDefinition::new(
                "add",
                "Add two integers",
                json!({
                    "type": "object",
                    "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                    "required": ["a", "b"],
                    "additionalProperties": false
                }),
            ),
            ToolDefinition::new("divide", "Divide", json!({"type": "object"})),
        ],
        answer: |name, args| match name {
            "add" => {
                let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                Ok(json!({"content": [{"type": "text", "text": sum.to_string()}]}))
            }
            _ => Ok(json!({"isError": true, "content": [{"type": "text", "text": "division by zero"}]})),
        },
        calls: Mutex::new(Vec::new()),
    })
}

fn notes() -> Arc<FakeServer> {
    Arc::new(FakeServer {
        tools: vec![
            ToolDefinition::new("write_note", "Save a note", json!({"type": "object"})),
            ToolDefinition::new("delete_note", "Delete a note", json!({"type": "object"})),
        ],
        answer: |_, _| Ok(json!({"success": true, "result": "saved"})),
        calls: Mutex::new(Vec::new()),
    })
}

struct Harness {
    store: Arc<InMemoryStore>,
    executor: Arc<ToolExecutor>,
    calculator: Arc<FakeServer>,
    notes_server: ToolServerConfig,
}

fn harness() -> Harness {
    let calculator = calculator();
    let notes = notes();

    let calc_server = ToolServerConfig::local_process("calculator", "calc-server", vec![]);
    let notes_server =
        ToolServerConfig::remote_endpoint("notes", "https://notes.example.com/").owned_by("alice");

    let store = Arc::new(InMemoryStore::new());
    store.insert_server(calc_server).unwrap();
    store.insert_server(notes_server.clone()).unwrap();

    let factory = ConnectorFactory::new()
        .with_transport(TransportKind::LocalProcess, Arc::new(Fixed(calculator.clone())))
        .with_transport(TransportKind::RemoteEndpoint, Arc::new(Fixed(notes)));
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(factory), BreakerConfig::default()));
    let index = Arc::new(ToolIndex::new(store.clone(), registry));
    let executor = Arc::new(ToolExecutor::new(
        index,
        Sanitizer::new(SanitizerConfig::default()),
        ExecutorConfig::default(),
    ));

    Harness {
        store,
        executor,
        calculator,
        notes_server,
    }
}

#[tokio::test]
async fn full_turn_with_a_batch_of_tool_calls() {
    let h = harness();
    h.store
        .disable_tool("alice", h.notes_server.id, "delete_note")
        .unwrap();

    let provider = Arc::new(StepProvider {
        steps: vec![
            step(|_| {
                ChatResponse::with_tool_calls(vec![
                    ToolCall::new("c1", "add", json!(r#"{"a": "2", "b": 3, "note": "x"}"#)),
                    ToolCall::new("c2", "divide", json!({"a": 1, "b": 0})),
                    ToolCall::new("c3", "write_note", json!({"text": "2 + 3 = 5"})),
                ])
            }),
            step(|_| ChatResponse::text("2 + 3 = 5, and I saved a note.")),
        ],
        seen: Mutex::new(Vec::new()),
    });

    let agent = AgentLoop::new(provider.clone(), h.executor.clone());
    let outcome = agent
        .run(
            vec![ChatMessage::system("Be brief."), ChatMessage::user("add 2 and 3")],
            RunOptions::new("alice", "test-model"),
        )
        .await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.final_content.as_deref(), Some("2 + 3 = 5, and I saved a note."));
    assert_eq!(outcome.tool_calls_made, 3);
    assert_eq!(outcome.iterations_used, 1);

    let seen = provider.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, ["write_note", "add", "divide"]);

    let tool_entries: Vec<(&str, &str)> = outcome
        .transcript
        .iter()
        .filter(|m| m.role == "tool")
        .map(|m| (m.tool_call_id.as_deref().unwrap_or(""), m.content.as_str()))
        .collect();
    assert_eq!(
        tool_entries,
        [
            ("c1", "5"),
            ("c2", "Error: Tool 'divide' failed: division by zero"),
            ("c3", "saved"),
        ]
    );

    // The second model call sees the assistant tool-call entry followed by the results.
    let history = &seen[1].0;
    assert_eq!(history.len(), 6);
    assert_eq!(history[2].tool_calls.as_ref().map(Vec::len), Some(3));

    let calls = h.calculator.calls.lock().unwrap();
    let add = calls.iter().find(|(name, _)| name == "add").unwrap();
    assert_eq!(add.1, json!({"a": 2, "b": 3}));
}

#[tokio::test]
async fn transcript_entries_serialize_in_provider_vocabulary() {
    let h = harness();
    let provider = Arc::new(StepProvider {
        steps: vec![
            step(|_| {
                ChatResponse::with_tool_calls(vec![ToolCall::new("c1", "add", json!({"a": 1, "b": 1}))])
            }),
            step(|_| ChatResponse::text("2")),
        ],
        seen: Mutex::new(Vec::new()),
    });

    let outcome = AgentLoop::new(provider, h.executor.clone())
        .run(vec![ChatMessage::user("1+1?")], RunOptions::new("bob", "m"))
        .await;

    let tool_entry = serde_json::to_value(&outcome.transcript[2]).unwrap();
    assert_eq!(
        tool_entry,
        json!({"role": "tool", "tool_call_id": "c1", "name": "add", "content": "2"})
    );
}

fn divide_by_zero(_: &ChatRequest<'_>) -> ChatResponse {
    ChatResponse::with_tool_calls(vec![ToolCall::new("d", "divide", json!({}))])
}

#[tokio::test]
async fn repeated_failures_open_the_circuit_mid_run() {
    let h = harness();
    let mut steps: Vec<Step> = (0..4).map(|_| step(divide_by_zero)).collect();
    steps.push(step(|_| ChatResponse::text("giving up")));
    let provider = Arc::new(StepProvider {
        steps,
        seen: Mutex::new(Vec::new()),
    });

    let outcome = AgentLoop::new(provider, h.executor.clone())
        .run(vec![ChatMessage::user("divide")], RunOptions::new("bob", "m"))
        .await;

    assert!(outcome.success);
    let results: Vec<&str> = outcome
        .transcript
        .iter()
        .filter(|m| m.role == "tool")
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(results.len(), 4);
    assert!(results[..3].iter().all(|r| r.contains("division by zero")));
    assert!(results[3].contains("circuit open"));
    assert_eq!(h.calculator.calls.lock().unwrap().len(), 3);
}
