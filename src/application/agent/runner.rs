use super::models::{AgentError, AgentEvent, AgentOutcome, AgentStep, DEFAULT_MAX_TOOL_STEPS};
use crate::config::AgentDefinition;
use crate::model::{ModelProvider, ModelRequest, OllamaClient, ToolDefinition};
use crate::tooling::{ServerManager, ToolServerInterface, extract_tool_message};
use crate::types::{ChatHistory, ChatMessage, ToolCall};
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// The wired-up agent: a model provider, the connected tool servers, and
/// the conversation history they share.
pub struct Agent<P: ModelProvider> {
    provider: P,
    servers: Arc<dyn ToolServerInterface>,
    model: String,
    tools: Vec<ToolDefinition>,
    history: Mutex<ChatHistory>,
    max_tool_steps: usize,
}

impl Agent<OllamaClient> {
    /// Async factory: build the model client from the definition's host,
    /// connect the declared servers, and register the tools they expose.
    pub async fn create(definition: &AgentDefinition) -> Self {
        let provider = OllamaClient::new(definition.host.clone());
        let servers = Arc::new(ServerManager::connect_all(&definition.servers).await);
        Self::with_parts(
            provider,
            servers,
            definition.ai_model_id.clone(),
            &definition.system_message,
        )
    }
}

impl<P: ModelProvider> Agent<P> {
    pub fn with_parts(
        provider: P,
        servers: Arc<dyn ToolServerInterface>,
        model: String,
        system_message: &str,
    ) -> Self {
        let tools = servers
            .registered_tools()
            .into_iter()
            .map(|registered| ToolDefinition {
                name: registered.info.name,
                description: registered.info.description.unwrap_or_default(),
                parameters: registered
                    .info
                    .input_schema
                    .unwrap_or_else(empty_parameters),
            })
            .collect();

        let mut history = ChatHistory::new();
        history.add_system_message(compose_system_message(
            system_message,
            &servers.server_instructions(),
        ));

        Self {
            provider,
            servers,
            model,
            tools,
            history: Mutex::new(history),
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        }
    }

    pub fn with_max_tool_steps(mut self, max_tool_steps: usize) -> Self {
        self.max_tool_steps = max_tool_steps;
        self
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.messages().to_vec()
    }

    /// Run one user turn to completion.
    pub async fn run_agent(&self, input: impl Into<String>) -> Result<AgentOutcome, AgentError> {
        self.run_inner(input.into(), None).await
    }

    /// Run one user turn, emitting progress events while the model streams.
    pub async fn run_agent_streaming(
        &self,
        input: impl Into<String>,
        events: UnboundedSender<AgentEvent>,
    ) -> Result<AgentOutcome, AgentError> {
        self.run_inner(input.into(), Some(events)).await
    }

    async fn run_inner(
        &self,
        input: String,
        events: Option<UnboundedSender<AgentEvent>>,
    ) -> Result<AgentOutcome, AgentError> {
        info!("Agent run started");
        {
            let mut history = self.history.lock().await;
            history.add_user_message(input);
        }

        let mut steps = Vec::new();
        let mut thinking = String::new();
        let mut remaining = self.max_tool_steps;

        loop {
            let messages = self.history.lock().await.messages().to_vec();
            let request = ModelRequest {
                model: self.model.clone(),
                messages,
                tools: self.tools.clone(),
            };
            let turn = self.model_turn(request, events.as_ref()).await?;
            if let Some(delta) = &turn.thinking {
                thinking.push_str(delta);
            }

            if turn.tool_calls.is_empty() {
                let history = {
                    let mut history = self.history.lock().await;
                    history.add_message(
                        ChatMessage::assistant(turn.content.clone())
                            .with_thinking(turn.thinking.clone()),
                    );
                    history.messages().to_vec()
                };
                info!("Agent returned final response");
                return Ok(AgentOutcome {
                    response: turn.content,
                    thinking: (!thinking.is_empty()).then(|| thinking.clone()),
                    steps,
                    history,
                });
            }

            {
                let mut history = self.history.lock().await;
                history.add_message(
                    ChatMessage::assistant(turn.content.clone())
                        .with_thinking(turn.thinking.clone())
                        .with_tool_calls(turn.tool_calls.clone()),
                );
            }

            for call in turn.tool_calls {
                if remaining == 0 {
                    warn!("Agent exceeded max tool interactions");
                    return Err(AgentError::MaxToolSteps(self.max_tool_steps));
                }
                remaining -= 1;

                let tool = call.function.name;
                let arguments = call.function.arguments;
                info!(tool = tool.as_str(), "Agent requested tool execution");
                emit(
                    &events,
                    AgentEvent::ToolCall {
                        tool: tool.clone(),
                        arguments: arguments.clone(),
                    },
                );

                let output = self.servers.invoke_tool(&tool, arguments.clone()).await?;
                let success = !output
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let message = extract_tool_message(&output);
                info!(tool = tool.as_str(), success, "Tool executed");
                emit(
                    &events,
                    AgentEvent::ToolResult {
                        tool: tool.clone(),
                        success,
                        message: message.clone(),
                    },
                );

                let content = message.clone().unwrap_or_else(|| output.to_string());
                {
                    let mut history = self.history.lock().await;
                    history.add_message(ChatMessage::tool(tool.clone(), content));
                }
                steps.push(AgentStep {
                    tool,
                    input: arguments,
                    success,
                    output,
                    message,
                });
            }
        }
    }

    async fn model_turn(
        &self,
        request: ModelRequest,
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> Result<ModelTurn, AgentError> {
        let Some(events) = events else {
            let response = self.provider.chat(request).await?;
            return Ok(ModelTurn {
                content: response.message.content,
                thinking: response.message.thinking,
                tool_calls: response.message.tool_calls.unwrap_or_default(),
            });
        };

        let mut stream = self.provider.chat_stream(request).await?;
        let mut turn = ModelTurn::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.thinking {
                let _ = events.send(AgentEvent::Thinking(delta.clone()));
                turn.thinking
                    .get_or_insert_with(String::new)
                    .push_str(&delta);
            }
            if let Some(delta) = chunk.content {
                let _ = events.send(AgentEvent::MessageDelta(delta.clone()));
                turn.content.push_str(&delta);
            }
            turn.tool_calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }
        Ok(turn)
    }
}

#[derive(Debug, Default)]
struct ModelTurn {
    content: String,
    thinking: Option<String>,
    tool_calls: Vec<ToolCall>,
}

fn emit(events: &Option<UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}

fn compose_system_message(system_message: &str, instructions: &[(String, String)]) -> String {
    if instructions.is_empty() {
        return system_message.to_string();
    }
    let mut text = system_message.trim_end().to_string();
    for (server, instruction) in instructions {
        text.push_str(&format!("\n\nServer '{server}' guidance: {instruction}"));
    }
    text
}

fn empty_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}
