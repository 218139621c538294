use super::ToolInvokeError;
use super::connection::McpTransport;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, ToolInvokeError>>>;

/// Legacy SSE transport: a long-lived GET event stream delivers responses,
/// requests are POSTed to the endpoint announced by the server.
pub(crate) struct SseTransport {
    server: String,
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
}

impl SseTransport {
    /// Opens the event stream and waits for the server to announce its
    /// message endpoint.
    pub(crate) async fn connect(
        server: &str,
        url: &str,
        http: Client,
    ) -> Result<Self, ToolInvokeError> {
        let mut source =
            http.get(url)
                .eventsource()
                .map_err(|source| ToolInvokeError::Transport {
                    server: server.to_string(),
                    message: source.to_string(),
                })?;

        let endpoint = loop {
            match source.next().await {
                Some(Ok(Event::Open)) => continue,
                Some(Ok(Event::Message(message))) if message.event == "endpoint" => {
                    break resolve_endpoint(server, url, message.data.trim())?;
                }
                Some(Ok(Event::Message(message))) => {
                    debug!(
                        server,
                        event = message.event.as_str(),
                        "ignoring event before endpoint announcement"
                    );
                }
                Some(Err(source)) => {
                    return Err(ToolInvokeError::Transport {
                        server: server.to_string(),
                        message: source.to_string(),
                    });
                }
                None => {
                    return Err(ToolInvokeError::Terminated {
                        server: server.to_string(),
                    });
                }
            }
        };
        debug!(server, endpoint = endpoint.as_str(), "SSE endpoint resolved");

        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(reader_loop(
            server.to_string(),
            source,
            Arc::clone(&pending),
        ));

        Ok(Self {
            server: server.to_string(),
            http,
            endpoint,
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    fn http_error(&self, source: reqwest::Error) -> ToolInvokeError {
        ToolInvokeError::Http {
            server: self.server.clone(),
            source,
        }
    }

    async fn post(&self, payload: &Value) -> Result<(), ToolInvokeError> {
        self.http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|source| self.http_error(source))?
            .error_for_status()
            .map_err(|source| self.http_error(source))?;
        Ok(())
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        if let Err(err) = self.post(&payload).await {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(envelope)) => super::response_result(&self.server, envelope),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ToolInvokeError::Cancelled {
                server: self.server.clone(),
            }),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.post(&payload).await
    }
}

async fn reader_loop(server: String, mut source: EventSource, pending: Arc<Mutex<PendingMap>>) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => continue,
            Ok(Event::Message(message)) => {
                if message.event != "message" {
                    debug!(
                        server = server.as_str(),
                        event = message.event.as_str(),
                        "ignoring unrecognized event"
                    );
                    continue;
                }
                match serde_json::from_str::<Value>(&message.data) {
                    Ok(value) => route_message(&server, &pending, value).await,
                    Err(source) => {
                        warn!(
                            server = server.as_str(),
                            %source,
                            "received invalid JSON from MCP server"
                        );
                    }
                }
            }
            Err(source) => {
                warn!(server = server.as_str(), %source, "event stream failed");
                break;
            }
        }
    }
    source.close();

    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Err(ToolInvokeError::Terminated {
            server: server.clone(),
        }));
    }
}

async fn route_message(server: &str, pending: &Arc<Mutex<PendingMap>>, value: Value) {
    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            debug!(server, method, "received notification from server");
        }
        return;
    };
    if value.get("method").is_some() {
        // Server-initiated request; nothing to route it to.
        debug!(server, id, "ignoring server-initiated request");
        return;
    }

    let sender = {
        let mut pending = pending.lock().await;
        pending.remove(&id)
    };
    match sender {
        Some(sender) => {
            let _ = sender.send(Ok(value));
        }
        None => debug!(server, id, "received response for unknown request"),
    }
}

fn resolve_endpoint(server: &str, base: &str, data: &str) -> Result<String, ToolInvokeError> {
    let base_url = Url::parse(base).map_err(|source| ToolInvokeError::Transport {
        server: server.to_string(),
        message: format!("invalid server URL '{base}': {source}"),
    })?;
    let resolved = base_url
        .join(data)
        .map_err(|source| ToolInvokeError::Transport {
            server: server.to_string(),
            message: format!("invalid endpoint '{data}': {source}"),
        })?;
    Ok(resolved.to_string())
}
