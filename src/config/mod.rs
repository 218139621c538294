mod error;
mod server;

pub use error::ConfigError;
pub use server::{ServerConfig, TransportKind};

use dotenvy::from_filename;
use serde::Deserialize;
use server::RawServer;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.json";
pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a helpful assistant. Use your tools to assist users.";

const ENV_HOST: &str = "OLLAMA_HOST";
const ENV_MODEL: &str = "AGENT_MODEL";

static ENV_LOADER: Once = Once::new();

/// Agent definition loaded from a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub ai_model_id: String,
    pub host: String,
    pub system_message: String,
    pub servers: Vec<ServerConfig>,
}

/// Raw structure for deserialization from JSON
#[derive(Debug, Deserialize, Default)]
struct RawDefinition {
    ai_model_id: Option<String>,
    host: Option<String>,
    system_message: Option<String>,
    #[serde(default)]
    servers: BTreeMap<String, RawServer>,
}

/// Ensures environment variables are loaded from config/.env
fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename("config/.env");
    });
}

impl AgentDefinition {
    /// Load an agent definition from a file path (or the default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        ensure_env_loaded();
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let definition = read_definition(path)?;
        info!(
            path = %path.display(),
            model = definition.ai_model_id.as_str(),
            servers = definition.servers.len(),
            "Loaded agent definition"
        );
        Ok(definition)
    }

    /// Parse an agent definition from a JSON string.
    pub fn from_json(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let parsed: RawDefinition =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        validate_and_build(parsed)
    }
}

fn read_definition(path: &Path) -> Result<AgentDefinition, ConfigError> {
    debug!(path = %path.display(), "Reading agent definition file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    AgentDefinition::from_json(&content, path)
}

fn validate_and_build(parsed: RawDefinition) -> Result<AgentDefinition, ConfigError> {
    let ai_model_id = env::var(ENV_MODEL)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or(parsed.ai_model_id)
        .ok_or(ConfigError::MissingModelId)?;

    let host = env::var(ENV_HOST)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or(parsed.host)
        .ok_or(ConfigError::MissingHost)?;
    let host = shellexpand::full(&host)
        .map(|cow| cow.into_owned())
        .unwrap_or(host);

    let system_message = parsed
        .system_message
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string());

    let mut servers = Vec::with_capacity(parsed.servers.len());
    for (name, raw) in parsed.servers {
        servers.push(ServerConfig::from_raw(name, raw)?);
    }

    Ok(AgentDefinition {
        ai_model_id,
        host,
        system_message,
        servers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<AgentDefinition, ConfigError> {
        AgentDefinition::from_json(content, Path::new("agent.json"))
    }

    #[test]
    fn loads_full_definition() {
        let definition = parse(
            r#"{
                "ai_model_id": "gpt-oss:20b",
                "host": "http://ollama.home",
                "system_message": "Answer briefly.",
                "servers": {
                    "ff_tools": { "url": "http://192.168.86.103:8000/mcp", "type": "http" },
                    "weather": { "url": "http://tools.local:9000/sse", "type": "sse" }
                }
            }"#,
        )
        .expect("valid definition");

        assert_eq!(definition.ai_model_id, "gpt-oss:20b");
        assert_eq!(definition.host, "http://ollama.home");
        assert_eq!(definition.system_message, "Answer briefly.");
        assert_eq!(definition.servers.len(), 2);
        assert_eq!(definition.servers[0].name, "ff_tools");
        assert_eq!(definition.servers[0].transport, TransportKind::Http);
        assert_eq!(definition.servers[1].transport, TransportKind::Sse);
    }

    #[test]
    fn system_message_defaults_when_absent() {
        let definition = parse(r#"{ "ai_model_id": "llama3", "host": "http://localhost:11434" }"#)
            .expect("valid definition");
        assert_eq!(definition.system_message, DEFAULT_SYSTEM_MESSAGE);
        assert!(definition.servers.is_empty());
    }

    #[test]
    fn missing_model_id_is_reported() {
        let result = parse(r#"{ "host": "http://localhost:11434" }"#);
        assert!(matches!(result, Err(ConfigError::MissingModelId)));
    }

    #[test]
    fn missing_host_is_reported() {
        let result = parse(r#"{ "ai_model_id": "llama3" }"#);
        assert!(matches!(result, Err(ConfigError::MissingHost)));
    }

    #[test]
    fn malformed_json_is_reported() {
        let result = parse("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn server_without_url_is_a_parse_error() {
        let result = parse(
            r#"{
                "ai_model_id": "llama3",
                "host": "http://localhost:11434",
                "servers": { "broken": { "type": "http" } }
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn unknown_server_type_is_a_parse_error() {
        let result = parse(
            r#"{
                "ai_model_id": "llama3",
                "host": "http://localhost:11434",
                "servers": { "broken": { "url": "http://x/mcp", "type": "grpc" } }
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
