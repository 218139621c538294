use crate::model::ModelError;
use crate::tooling::ToolInvokeError;
use crate::types::ChatMessage;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_TOOL_STEPS: usize = 8;

/// One executed tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub tool: String,
    pub input: Value,
    pub success: bool,
    pub output: Value,
    pub message: Option<String>,
}

/// Result of a `run_agent` call: the final reply plus everything that
/// accumulated along the way.
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub steps: Vec<AgentStep>,
    pub history: Vec<ChatMessage>,
}

/// Progress events emitted while a run is streaming.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Thinking(String),
    MessageDelta(String),
    ToolCall { tool: String, arguments: Value },
    ToolResult {
        tool: String,
        success: bool,
        message: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Tool(#[from] ToolInvokeError),
    #[error("agent exceeded the maximum of {0} tool interactions")]
    MaxToolSteps(usize),
}

impl AgentError {
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Model(err) => err.user_message(),
            AgentError::Tool(err) => err.to_string(),
            AgentError::MaxToolSteps(limit) => format!(
                "The agent stopped after {limit} tool calls without reaching an answer."
            ),
        }
    }
}
