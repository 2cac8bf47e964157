//! JSON-RPC over streamable HTTP, as a Tower service.
//!
//! One [`RpcCall`] is one POST. The reply is either a plain JSON body or an
//! SSE stream whose `data:` payloads are JSON-RPC messages; in both cases the
//! message answering the call's id is picked out.

use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tower::{BoxError, Service};
use tracing::debug;

use crate::error::{AgentsError, Result};

pub(crate) const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug, Clone)]
pub(crate) struct RpcCall {
    pub method: String,
    pub params: Option<Value>,
    /// `None` for notifications
    pub id: Option<i64>,
}

impl RpcCall {
    pub fn request(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
            id: Some(id),
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
            id: None,
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({"jsonrpc": "2.0", "method": self.method});
        if let Some(id) = self.id {
            body["id"] = json!(id);
        }
        if let Some(params) = &self.params {
            body["params"] = params.clone();
        }
        body
    }
}

#[derive(Clone)]
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    endpoint: Arc<str>,
    session_id: Arc<RwLock<Option<String>>>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            session_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|s| s.clone())
    }

    fn remember_session(&self, id: &str) {
        if let Ok(mut slot) = self.session_id.write() {
            if slot.as_deref() != Some(id) {
                debug!("search session established");
                *slot = Some(id.to_string());
            }
        }
    }

    async fn send(&self, call: RpcCall) -> Result<Value> {
        let mut request = self
            .client
            .post(self.endpoint.as_ref())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(&call.body());
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.remember_session(session);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body.trim());
            // The server answered and refused (bad credential, bad request);
            // asking again will not help. Server-side failures might.
            return Err(if status.is_client_error() {
                AgentsError::application(message)
            } else {
                AgentsError::transport(message)
            });
        }

        let Some(id) = call.id else {
            return Ok(Value::Null);
        };

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response.text().await?;

        let messages = if is_sse {
            parse_sse_messages(&text)
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Array(items)) => items,
                Ok(single) => vec![single],
                Err(e) => {
                    return Err(AgentsError::transport(format!(
                        "undecodable reply to '{}': {}",
                        call.method, e
                    )))
                }
            }
        };
        decode_response(messages, id)
    }

    /// Ends the server-side session, if one was opened.
    pub async fn delete_session(&self) -> Result<()> {
        let Some(session) = self.session_id() else {
            return Ok(());
        };
        self.client
            .delete(self.endpoint.as_ref())
            .header(SESSION_HEADER, session)
            .send()
            .await?;
        Ok(())
    }
}

impl Service<RpcCall> for HttpTransport {
    type Response = Value;
    type Error = BoxError;
    type Future = BoxFuture<'static, std::result::Result<Value, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), BoxError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: RpcCall) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.send(call).await.map_err(|e| Box::new(e) as BoxError) })
    }
}

/// JSON payloads of every SSE event in `body`; non-JSON events are skipped.
pub(crate) fn parse_sse_messages(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    let mut flush = |data: &mut String| {
        if !data.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(data) {
                messages.push(value);
            }
            data.clear();
        }
    };

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data);
        } else if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
        }
    }
    flush(&mut data);
    messages
}

/// Result of the message answering `id`. A JSON-RPC error object is an
/// application failure: the server understood the call and rejected it.
pub(crate) fn decode_response(messages: Vec<Value>, id: i64) -> Result<Value> {
    let reply = messages
        .into_iter()
        .find(|m| m.get("id").and_then(Value::as_i64) == Some(id))
        .ok_or_else(|| AgentsError::transport(format!("missing response for request id {}", id)))?;

    if let Some(error) = reply.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AgentsError::application(format!(
            "JSON-RPC error {}: {}",
            code, message
        )));
    }
    Ok(reply.get("result").cloned().unwrap_or(Value::Null))
}
