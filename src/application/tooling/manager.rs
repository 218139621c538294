use super::connection::McpConnection;
use super::{RegisteredTool, ToolInvokeError, ToolServerInterface};
use crate::config::ServerConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Owns one connection per configured MCP server and the aggregated tool
/// registry built from their catalogues.
pub struct ServerManager {
    connections: HashMap<String, Arc<McpConnection>>,
    /// Connection order, for stable tool listings.
    names: Vec<String>,
    /// Tool name to owning server.
    registry: HashMap<String, String>,
}

impl ServerManager {
    /// Connect to every configured server. Connecting is best-effort: a
    /// server that cannot be reached is logged and skipped.
    pub async fn connect_all(servers: &[ServerConfig]) -> Self {
        let http = Client::new();
        let mut manager = Self {
            connections: HashMap::new(),
            names: Vec::new(),
            registry: HashMap::new(),
        };

        for config in servers {
            match McpConnection::connect(config, http.clone()).await {
                Ok(connection) => {
                    for tool in connection.tools() {
                        match manager.registry.entry(tool.name.clone()) {
                            Entry::Vacant(slot) => {
                                slot.insert(config.name.clone());
                            }
                            Entry::Occupied(existing) => {
                                warn!(
                                    tool = tool.name.as_str(),
                                    server = config.name.as_str(),
                                    owner = existing.get().as_str(),
                                    "Tool name already registered; keeping first registration"
                                );
                            }
                        }
                    }
                    manager.names.push(config.name.clone());
                    manager
                        .connections
                        .insert(config.name.clone(), Arc::new(connection));
                }
                Err(err) => {
                    error!(
                        server = config.name.as_str(),
                        %err,
                        "Error connecting to MCP server; skipping"
                    );
                }
            }
        }

        manager
    }

    pub fn server_count(&self) -> usize {
        self.names.len()
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }
}

#[async_trait]
impl ToolServerInterface for ServerManager {
    fn registered_tools(&self) -> Vec<RegisteredTool> {
        let mut tools = Vec::with_capacity(self.registry.len());
        for name in &self.names {
            let Some(connection) = self.connections.get(name) else {
                continue;
            };
            for info in connection.tools() {
                // Skip catalogue entries shadowed by an earlier server.
                if self.registry.get(&info.name) != Some(name) {
                    continue;
                }
                tools.push(RegisteredTool {
                    server: name.clone(),
                    info: info.clone(),
                });
            }
        }
        tools
    }

    fn server_instructions(&self) -> Vec<(String, String)> {
        self.names
            .iter()
            .filter_map(|name| {
                let connection = self.connections.get(name)?;
                let instructions = connection.instructions()?;
                Some((name.clone(), instructions.to_string()))
            })
            .collect()
    }

    async fn invoke_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<Value, ToolInvokeError> {
        let server = self
            .registry
            .get(tool)
            .ok_or_else(|| ToolInvokeError::UnknownTool {
                tool: tool.to_string(),
            })?;
        let connection =
            self.connections
                .get(server)
                .ok_or_else(|| ToolInvokeError::NotConnected {
                    server: server.clone(),
                })?;
        debug!(tool, server = server.as_str(), "Dispatching tool call");
        connection.call_tool(tool, arguments).await
    }
}
