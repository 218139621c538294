use super::ToolInvokeError;
use super::connection::McpTransport;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";

/// Streamable HTTP transport: every JSON-RPC message is POSTed to the
/// server URL; the response body is either plain JSON or a short-lived
/// event stream carrying the response.
pub(crate) struct HttpTransport {
    server: String,
    http: Client,
    url: String,
    next_id: AtomicU64,
    session: Mutex<Option<String>>,
}

impl HttpTransport {
    pub(crate) fn new(server: &str, url: &str, http: Client) -> Self {
        Self {
            server: server.to_string(),
            http,
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            session: Mutex::new(None),
        }
    }

    fn http_error(&self, source: reqwest::Error) -> ToolInvokeError {
        ToolInvokeError::Http {
            server: self.server.clone(),
            source,
        }
    }

    fn transport_error(&self, message: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::Transport {
            server: self.server.clone(),
            message: message.into(),
        }
    }

    async fn post(&self, payload: &Value) -> Result<Response, ToolInvokeError> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(payload);
        if let Some(session) = self.session.lock().await.clone() {
            builder = builder.header(SESSION_HEADER, session);
        }
        let response = builder
            .send()
            .await
            .map_err(|source| self.http_error(source))?
            .error_for_status()
            .map_err(|source| self.http_error(source))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut stored = self.session.lock().await;
            *stored = Some(session.to_string());
        }
        Ok(response)
    }

    async fn read_stream_response(
        &self,
        response: Response,
        id: u64,
    ) -> Result<Value, ToolInvokeError> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(item) = stream.next().await {
            let bytes = item.map_err(|source| self.http_error(source))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some((start, len)) = frame_boundary(&buffer) {
                let frame: String = buffer.drain(..start + len).collect();
                let Some(data) = sse_data(&frame) else {
                    continue;
                };
                let value: Value = serde_json::from_str(&data).map_err(|source| {
                    ToolInvokeError::InvalidJson {
                        server: self.server.clone(),
                        source,
                    }
                })?;
                if is_response_for(&value, id) {
                    return Ok(value);
                }
                debug!(
                    server = self.server.as_str(),
                    "ignoring interim event in response stream"
                );
            }
        }
        Err(self.transport_error("event stream ended without a response"))
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let response = self.post(&payload).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        let envelope = if content_type.starts_with("text/event-stream") {
            self.read_stream_response(response, id).await?
        } else {
            let body = response
                .bytes()
                .await
                .map_err(|source| self.http_error(source))?;
            serde_json::from_slice(&body).map_err(|source| ToolInvokeError::InvalidJson {
                server: self.server.clone(),
                source,
            })?
        };
        super::response_result(&self.server, envelope)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.post(&payload).await?;
        Ok(())
    }
}

/// Finds the end of the first complete SSE frame, returning its offset and
/// the length of the terminator.
fn frame_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|pos| (pos, 2));
    let crlf = buffer.find("\r\n\r\n").map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (found, None) => found,
        (None, found) => found,
    }
}

/// Joins the data lines of one SSE frame.
fn sse_data(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn is_response_for(value: &Value, id: u64) -> bool {
    value.get("id").and_then(Value::as_u64) == Some(id)
        && (value.get("result").is_some() || value.get("error").is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_data_from_frame() {
        let frame = "event: message\ndata: {\"jsonrpc\":\"2.0\"}\n";
        assert_eq!(sse_data(frame).as_deref(), Some("{\"jsonrpc\":\"2.0\"}"));
    }

    #[test]
    fn joins_multi_line_data() {
        let frame = "data: {\ndata: \"a\": 1}\n";
        assert_eq!(sse_data(frame).as_deref(), Some("{\n\"a\": 1}"));
    }

    #[test]
    fn ignores_frames_without_data() {
        assert_eq!(sse_data(": keep-alive\n"), None);
    }

    #[test]
    fn finds_frame_boundaries_for_both_line_endings() {
        assert_eq!(frame_boundary("data: x\n\nrest"), Some((7, 2)));
        assert_eq!(frame_boundary("data: x\r\n\r\nrest"), Some((7, 4)));
        assert_eq!(frame_boundary("data: x"), None);
    }

    #[test]
    fn matches_response_by_id() {
        let response = json!({"jsonrpc": "2.0", "id": 3, "result": {}});
        assert!(is_response_for(&response, 3));
        assert!(!is_response_for(&response, 4));
        let request = json!({"jsonrpc": "2.0", "id": 3, "method": "ping"});
        assert!(!is_response_for(&request, 3));
    }
}
