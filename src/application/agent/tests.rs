use super::{Agent, AgentError, AgentEvent};
use crate::model::{
    ChunkStream, ModelError, ModelProvider, ModelRequest, ModelResponse, StreamChunk,
};
use crate::tooling::{
    RegisteredTool, RemoteToolInfo, ToolInvokeError, ToolServerInterface,
};
use crate::types::{ChatMessage, MessageRole, ToolCall};
use async_trait::async_trait;
use futures::stream;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

#[derive(Clone, Default)]
struct ScriptedProvider {
    turns: Arc<Mutex<VecDeque<ChatMessage>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<ChatMessage>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_turn(&self, request: ModelRequest) -> Result<ChatMessage, ModelError> {
        self.requests.lock().await.push(request);
        self.turns
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".into()))
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let message = self.next_turn(request).await?;
        Ok(ModelResponse { message })
    }

    async fn chat_stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError> {
        let message = self.next_turn(request).await?;
        let mut chunks = Vec::new();
        if let Some(thinking) = message.thinking {
            chunks.push(Ok(StreamChunk {
                thinking: Some(thinking),
                ..StreamChunk::default()
            }));
        }
        if !message.content.is_empty() {
            let midpoint = message.content.len() / 2;
            let (first, second) = message.content.split_at(midpoint);
            for part in [first, second] {
                if !part.is_empty() {
                    chunks.push(Ok(StreamChunk {
                        content: Some(part.to_string()),
                        ..StreamChunk::default()
                    }));
                }
            }
        }
        if let Some(calls) = message.tool_calls {
            chunks.push(Ok(StreamChunk {
                tool_calls: calls,
                ..StreamChunk::default()
            }));
        }
        chunks.push(Ok(StreamChunk {
            done: true,
            ..StreamChunk::default()
        }));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

struct StaticTools {
    tools: Vec<RegisteredTool>,
    result: Value,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticTools {
    fn new(result: Value) -> Self {
        Self {
            tools: vec![RegisteredTool {
                server: "ff_tools".to_string(),
                info: RemoteToolInfo {
                    name: "lookup".to_string(),
                    description: Some("Look things up".to_string()),
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {"city": {"type": "string"}}
                    })),
                },
            }],
            result,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ToolServerInterface for StaticTools {
    fn registered_tools(&self) -> Vec<RegisteredTool> {
        self.tools.clone()
    }

    fn server_instructions(&self) -> Vec<(String, String)> {
        vec![(
            "ff_tools".to_string(),
            "Answer with data from the league.".to_string(),
        )]
    }

    async fn invoke_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, ToolInvokeError> {
        if !self.tools.iter().any(|t| t.info.name == tool) {
            return Err(ToolInvokeError::UnknownTool {
                tool: tool.to_string(),
            });
        }
        self.calls
            .lock()
            .await
            .push((tool.to_string(), arguments));
        Ok(self.result.clone())
    }
}

fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

fn tool_call_turn(name: &str, arguments: Value) -> ChatMessage {
    ChatMessage::assistant("").with_tool_calls(vec![ToolCall::new(name, arguments)])
}

#[tokio::test]
async fn answers_directly_and_persists_history() {
    let provider = ScriptedProvider::new(vec![ChatMessage::assistant("hello there")]);
    let tools = Arc::new(StaticTools::new(text_result("unused")));
    let agent = Agent::with_parts(provider.clone(), tools, "llama3".into(), "Be helpful.");

    let outcome = agent.run_agent("hi").await.expect("run succeeds");

    assert_eq!(outcome.response, "hello there");
    assert!(outcome.steps.is_empty());
    assert!(outcome.thinking.is_none());

    let history = agent.history().await;
    let roles: Vec<_> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant
        ]
    );
    assert!(history[0].content.starts_with("Be helpful."));
    assert!(history[0].content.contains("Server 'ff_tools' guidance"));
    assert_eq!(outcome.history, history);

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "lookup");
}

#[tokio::test]
async fn executes_tool_calls_and_feeds_results_back() {
    let provider = ScriptedProvider::new(vec![
        tool_call_turn("lookup", json!({"city": "Jakarta"})),
        ChatMessage::assistant("It is sunny."),
    ]);
    let tools = Arc::new(StaticTools::new(text_result("42")));
    let agent = Agent::with_parts(
        provider.clone(),
        tools.clone(),
        "llama3".into(),
        "Be helpful.",
    );

    let outcome = agent.run_agent("weather?").await.expect("run succeeds");

    assert_eq!(outcome.response, "It is sunny.");
    assert_eq!(outcome.steps.len(), 1);
    assert!(outcome.steps[0].success);
    assert_eq!(outcome.steps[0].tool, "lookup");
    assert_eq!(outcome.steps[0].message.as_deref(), Some("42"));

    let calls = tools.calls.lock().await.clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["city"], "Jakarta");

    // The second model request must carry the tool result back.
    let requests = provider.requests().await;
    assert_eq!(requests.len(), 2);
    let fed_back = requests[1].messages.last().expect("tool message");
    assert_eq!(fed_back.role, MessageRole::Tool);
    assert_eq!(fed_back.content, "42");
    assert_eq!(fed_back.tool_name.as_deref(), Some("lookup"));

    let roles: Vec<_> = agent.history().await.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant
        ]
    );
}

#[tokio::test]
async fn propagates_unknown_tool_errors() {
    let provider = ScriptedProvider::new(vec![tool_call_turn("missing", json!({}))]);
    let tools = Arc::new(StaticTools::new(text_result("unused")));
    let agent = Agent::with_parts(provider, tools, "llama3".into(), "Be helpful.");

    let result = agent.run_agent("call something odd").await;
    assert!(matches!(
        result,
        Err(AgentError::Tool(ToolInvokeError::UnknownTool { .. }))
    ));
}

#[tokio::test]
async fn streaming_emits_deltas_and_tool_events() {
    let mut first = tool_call_turn("lookup", json!({"city": "Jakarta"}));
    first.thinking = Some("pondering".to_string());
    let provider = ScriptedProvider::new(vec![first, ChatMessage::assistant("Done!")]);
    let tools = Arc::new(StaticTools::new(text_result("42")));
    let agent = Agent::with_parts(provider, tools, "llama3".into(), "Be helpful.");

    let (events, mut receiver) = mpsc::unbounded_channel();
    let outcome = agent
        .run_agent_streaming("weather?", events)
        .await
        .expect("run succeeds");
    assert_eq!(outcome.response, "Done!");
    assert_eq!(outcome.thinking.as_deref(), Some("pondering"));

    let mut received = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        received.push(event);
    }
    assert!(matches!(received[0], AgentEvent::Thinking(ref t) if t == "pondering"));
    assert!(
        matches!(received[1], AgentEvent::ToolCall { ref tool, .. } if tool == "lookup")
    );
    assert!(matches!(
        received[2],
        AgentEvent::ToolResult { success: true, .. }
    ));
    let streamed: String = received
        .iter()
        .filter_map(|event| match event {
            AgentEvent::MessageDelta(delta) => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Done!");
}

#[tokio::test]
async fn enforces_max_tool_steps() {
    let turn = tool_call_turn("lookup", json!({}));
    let provider = ScriptedProvider::new(vec![turn.clone(), turn]);
    let tools = Arc::new(StaticTools::new(text_result("42")));
    let agent = Agent::with_parts(provider, tools, "llama3".into(), "Be helpful.")
        .with_max_tool_steps(1);

    let result = agent.run_agent("loop forever").await;
    assert!(matches!(result, Err(AgentError::MaxToolSteps(1))));
}
