mod connection;
mod http;
mod manager;
mod sse;

pub use connection::{McpConnection, extract_tool_message};
pub use manager::ServerManager;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub(crate) const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Error)]
pub enum ToolInvokeError {
    #[error("no tool named '{tool}' is registered")]
    UnknownTool { tool: String },
    #[error("MCP server '{server}' is not connected")]
    NotConnected { server: String },
    #[error("failed to reach MCP server '{server}': {source}")]
    Http {
        server: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("MCP server '{server}' returned invalid JSON: {source}")]
    InvalidJson {
        server: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("MCP server '{server}' closed the connection")]
    Terminated { server: String },
    #[error("MCP server '{server}' request cancelled")]
    Cancelled { server: String },
}

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// A tool together with the server that owns it.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub server: String,
    pub info: RemoteToolInfo,
}

/// Seam between the agent and the connected tool servers.
#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    /// All tools registered at startup, in connection order.
    fn registered_tools(&self) -> Vec<RegisteredTool>;

    /// Instructions advertised by servers during the initialize handshake.
    fn server_instructions(&self) -> Vec<(String, String)>;

    /// Invoke a registered tool by name.
    async fn invoke_tool(&self, tool: &str, arguments: Value)
    -> Result<Value, ToolInvokeError>;
}

/// Unwraps a JSON-RPC response envelope into its result.
pub(crate) fn response_result(server: &str, response: Value) -> Result<Value, ToolInvokeError> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Err(ToolInvokeError::Rpc {
            server: server.to_string(),
            code,
            message,
        });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}
