use super::ModelProvider;
use super::types::{
    ChunkStream, ModelError, ModelRequest, ModelResponse, StreamChunk, ToolDefinition,
};
use crate::types::ChatMessage;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use tracing::{debug, info};

/// Client for an Ollama-compatible `/api/chat` endpoint.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            http: client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{trimmed}/{path}")
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.endpoint("/api/chat");
        let payload = WireRequest::new(&request, false);
        info!(
            model = request.model.as_str(),
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending request to model provider"
        );
        let response: WireResponse = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Received response from model provider");

        let message = response
            .message
            .ok_or_else(|| ModelError::InvalidResponse("missing message field".into()))?;

        Ok(ModelResponse { message })
    }

    async fn chat_stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError> {
        let url = self.endpoint("/api/chat");
        let payload = WireRequest::new(&request, true);
        info!(
            model = request.model.as_str(),
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening streaming request to model provider"
        );
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let state = NdjsonState {
            inner: response
                .bytes_stream()
                .map(|item| item.map(|bytes| bytes.to_vec()))
                .boxed(),
            buffer: Vec::new(),
            finished: false,
        };

        // The endpoint streams one JSON object per line.
        let chunks = stream::unfold(state, |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                if let Some(pos) = state.buffer.iter().position(|byte| *byte == b'\n') {
                    let mut line: Vec<u8> = state.buffer.drain(..=pos).collect();
                    line.pop();
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some((parse_chunk(&line), state));
                }
                match state.inner.next().await {
                    Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                    Some(Err(source)) => {
                        state.finished = true;
                        return Some((Err(ModelError::Network(source)), state));
                    }
                    None => {
                        state.finished = true;
                        if state.buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let line = std::mem::take(&mut state.buffer);
                        return Some((parse_chunk(&line), state));
                    }
                }
            }
        });

        Ok(chunks.boxed())
    }
}

struct NdjsonState {
    inner: Pin<Box<dyn futures::Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>,
    buffer: Vec<u8>,
    finished: bool,
}

fn parse_chunk(line: &[u8]) -> Result<StreamChunk, ModelError> {
    let wire: WireResponse = serde_json::from_slice(line)
        .map_err(|source| ModelError::InvalidResponse(format!("invalid stream chunk: {source}")))?;
    Ok(StreamChunk::from(wire))
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

impl<'a> WireRequest<'a> {
    fn new(request: &'a ModelRequest, stream: bool) -> Self {
        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(WireTool::from).collect())
        };
        Self {
            model: &request.model,
            messages: &request.messages,
            stream,
            tools,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
}

impl From<WireResponse> for StreamChunk {
    fn from(wire: WireResponse) -> Self {
        let mut chunk = StreamChunk {
            done: wire.done,
            ..StreamChunk::default()
        };
        if let Some(message) = wire.message {
            if !message.content.is_empty() {
                chunk.content = Some(message.content);
            }
            chunk.thinking = message.thinking.filter(|t| !t.is_empty());
            chunk.tool_calls = message.tool_calls.unwrap_or_default();
        }
        chunk
    }
}
