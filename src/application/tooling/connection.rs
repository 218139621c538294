use super::http::HttpTransport;
use super::sse::SseTransport;
use super::{PROTOCOL_VERSION, RemoteToolInfo, ToolInvokeError};
use crate::config::{ServerConfig, TransportKind};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

/// One JSON-RPC channel to an MCP server, independent of the wire protocol.
#[async_trait]
pub(crate) trait McpTransport: Send + Sync {
    /// Send a request and wait for the matching response envelope.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError>;
}

/// An initialized connection to a single MCP server.
pub struct McpConnection {
    name: String,
    transport: Box<dyn McpTransport>,
    instructions: Option<String>,
    tools: Vec<RemoteToolInfo>,
}

impl McpConnection {
    /// Open the configured transport and run the initialize handshake.
    pub async fn connect(config: &ServerConfig, http: Client) -> Result<Self, ToolInvokeError> {
        info!(
            server = config.name.as_str(),
            url = config.url.as_str(),
            transport = ?config.transport,
            "Connecting to MCP server"
        );
        let transport: Box<dyn McpTransport> = match config.transport {
            TransportKind::Http => {
                Box::new(HttpTransport::new(&config.name, &config.url, http))
            }
            TransportKind::Sse => {
                Box::new(SseTransport::connect(&config.name, &config.url, http).await?)
            }
        };
        let mut connection = Self {
            name: config.name.clone(),
            transport,
            instructions: None,
            tools: Vec::new(),
        };
        connection.initialize().await?;
        Ok(connection)
    }

    async fn initialize(&mut self) -> Result<(), ToolInvokeError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let init_result = self.transport.request("initialize", params).await?;
        if let Some(text) = init_result.get("instructions").and_then(Value::as_str) {
            self.instructions = Some(text.to_string());
        }
        self.transport
            .notify("notifications/initialized", json!({}))
            .await?;

        let listed = self.transport.request("tools/list", json!({})).await?;
        self.tools = parse_tool_list(&listed);
        info!(
            server = self.name.as_str(),
            tools = self.tools.len(),
            "MCP server ready"
        );
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[RemoteToolInfo] {
        &self.tools
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, ToolInvokeError> {
        debug!(server = self.name.as_str(), tool, "Calling tool via MCP");
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        self.transport.request("tools/call", params).await
    }
}

fn parse_tool_list(result: &Value) -> Vec<RemoteToolInfo> {
    let mut tools = Vec::new();
    if let Some(array) = result.get("tools").and_then(Value::as_array) {
        for tool in array {
            if let Some(name) = tool.get("name").and_then(Value::as_str) {
                tools.push(RemoteToolInfo {
                    name: name.to_string(),
                    description: tool
                        .get("description")
                        .and_then(Value::as_str)
                        .map(|text| text.to_string()),
                    input_schema: tool.get("inputSchema").cloned(),
                });
            }
        }
    }
    tools
}

/// Pulls the first text block out of a tool-call result.
pub fn extract_tool_message(result: &Value) -> Option<String> {
    if let Some(array) = result.get("content").and_then(Value::as_array) {
        for block in array {
            if block
                .get("type")
                .and_then(Value::as_str)
                .map(|value| value.eq_ignore_ascii_case("text"))
                .unwrap_or(false)
            {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
            }
        }
    }

    if let Some(structured) = result.get("structuredContent").and_then(Value::as_object) {
        if let Some(error) = structured.get("error").and_then(Value::as_object) {
            if let Some(message) = error.get("message").and_then(Value::as_str) {
                let trimmed = message.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }

    None
}
