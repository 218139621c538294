mod ollama;
mod types;

pub use ollama::OllamaClient;
pub use types::{ChunkStream, ModelError, ModelRequest, ModelResponse, StreamChunk, ToolDefinition};

use async_trait::async_trait;

/// Seam between the agent and the inference endpoint.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a chat request and wait for the complete reply.
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Send a chat request and stream the reply chunk by chunk.
    async fn chat_stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError>;
}
