use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating an agent definition
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("agent definition not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read agent definition from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse agent definition from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required field 'ai_model_id' in agent definition")]
    MissingModelId,

    #[error("missing required field 'host' in agent definition")]
    MissingHost,

    #[error(
        "server '{server}' has no 'type' and its URL does not indicate a transport (expected '/mcp' or '/sse')"
    )]
    UnknownTransport { server: String },
}
