use super::error::ConfigError;
use serde::Deserialize;

/// Wire protocol used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streamable HTTP: JSON-RPC messages POSTed to the server URL.
    Http,
    /// Legacy SSE: GET event stream plus a POST message endpoint.
    Sse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    pub url: String,
    pub transport: TransportKind,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawServer {
    url: String,
    #[serde(rename = "type")]
    transport: Option<TransportKind>,
}

impl ServerConfig {
    pub(crate) fn from_raw(name: String, raw: RawServer) -> Result<Self, ConfigError> {
        let url = shellexpand::full(&raw.url)
            .map(|cow| cow.into_owned())
            .unwrap_or_else(|_| raw.url.clone());

        // An explicit type wins; otherwise the URL path decides, the way the
        // original server entries were written.
        let transport = match raw.transport {
            Some(kind) => kind,
            None => infer_transport(&url).ok_or_else(|| ConfigError::UnknownTransport {
                server: name.clone(),
            })?,
        };

        Ok(Self {
            name,
            url,
            transport,
        })
    }
}

fn infer_transport(url: &str) -> Option<TransportKind> {
    if url.contains("/sse") {
        Some(TransportKind::Sse)
    } else if url.contains("/mcp") {
        Some(TransportKind::Http)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn explicit_type_wins_over_url_shape() {
        let raw = RawServer {
            url: "http://tools.local/sse".to_string(),
            transport: Some(TransportKind::Http),
        };
        let config = ServerConfig::from_raw("tools".to_string(), raw).expect("valid server");
        assert_eq!(config.transport, TransportKind::Http);
    }

    #[test]
    fn transport_inferred_from_url() {
        let http = RawServer {
            url: "http://tools.local:8000/mcp".to_string(),
            transport: None,
        };
        let sse = RawServer {
            url: "http://tools.local:8000/sse".to_string(),
            transport: None,
        };
        assert_eq!(
            ServerConfig::from_raw("a".into(), http).expect("http").transport,
            TransportKind::Http
        );
        assert_eq!(
            ServerConfig::from_raw("b".into(), sse).expect("sse").transport,
            TransportKind::Sse
        );
    }

    #[test]
    fn ambiguous_url_without_type_is_rejected() {
        let raw = RawServer {
            url: "http://tools.local:8000/rpc".to_string(),
            transport: None,
        };
        let result = ServerConfig::from_raw("tools".to_string(), raw);
        assert!(matches!(
            result,
            Err(ConfigError::UnknownTransport { server }) if server == "tools"
        ));
    }

    #[test]
    fn expands_env_vars_in_url() {
        unsafe {
            env::set_var("TEST_TOOL_HOST", "tools.internal");
        }
        let raw = RawServer {
            url: "http://${TEST_TOOL_HOST}:8000/mcp".to_string(),
            transport: None,
        };
        let config = ServerConfig::from_raw("tools".to_string(), raw).expect("valid server");
        assert_eq!(config.url, "http://tools.internal:8000/mcp");
        unsafe {
            env::remove_var("TEST_TOOL_HOST");
        }
    }
}
