use crate::types::{ChatMessage, ToolCall};
use futures::Stream;
use reqwest::StatusCode;
use serde_json::Value;
use std::pin::Pin;
use thiserror::Error;

/// A callable function advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub message: ChatMessage,
}

/// One streamed fragment of a model reply.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub done: bool,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ModelError>> + Send>>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("model provider returned invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Network(err) => {
                if err.is_connect() {
                    "Could not reach the inference endpoint. Make sure the Ollama server is running and reachable."
                        .to_string()
                } else if err.is_timeout() {
                    "The request to the inference endpoint timed out. Try again in a moment."
                        .to_string()
                } else if let Some(status) = err.status() {
                    match status {
                        StatusCode::NOT_FOUND => {
                            "The inference endpoint was not found (404). Check that the host serves /api/chat."
                                .to_string()
                        }
                        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                            "The inference endpoint is currently unavailable. Try again later."
                                .to_string()
                        }
                        _ => format!(
                            "The request to the inference endpoint failed with status {}.",
                            status.as_u16()
                        ),
                    }
                } else {
                    "A network error occurred while contacting the inference endpoint.".to_string()
                }
            }
            ModelError::InvalidResponse(_) => {
                "The inference endpoint returned a response that could not be processed."
                    .to_string()
            }
        }
    }
}
