//! # Remote search over MCP
//!
//! [`McpSearchServer`] speaks the Model Context Protocol's streamable HTTP
//! transport to a hosted search server (Exa by default). Only the three calls
//! the agents need are implemented: `initialize`, `tools/list` and
//! `tools/call`. Every request goes through a Tower stack of
//! [`TimeoutLayer`] and [`RetryLayer`], so a slow or unreachable server is
//! retried once and then reported as a transport error, while a server that
//! answers with an error is reported as an application error straight away.
//!
//! Agents see the server through [`ToolServer`]: its tools are listed at the
//! start of each run and exposed to the model as [`RemoteTool`]s.

mod connectivity;
mod transport;

pub use connectivity::{check_connectivity, ConnectivityReport, ConnectivityStatus};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tower::{Layer, ServiceExt};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::{AgentsError, Result};
use crate::resilience::{
    into_agents_error, Retry, RetryLayer, RetryPolicy, Timeout, TimeoutLayer, TransportOnly,
};
use crate::tool::{Tool, ToolContext, ToolResult};
use transport::{HttpTransport, RpcCall};

pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// A source of tools discovered at run time.
#[async_trait]
pub trait ToolServer: Send + Sync {
    fn name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>>;
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            Content::Other => None,
        }
    }
}

/// Answer to `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<Content>,
    /// Set by the server when the tool itself failed (e.g. a rejected credential)
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// All text content joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(Content::as_text)
    }
}

type Stack = Retry<Timeout<HttpTransport>, TransportOnly>;

struct Inner {
    label: String,
    config: SearchConfig,
    transport: HttpTransport,
    stack: Stack,
    next_id: AtomicI64,
    initialized: OnceCell<()>,
    tools_cache: RwLock<Option<Vec<McpToolDefinition>>>,
}

/// Client for a remote MCP search server. Cheap to clone.
#[derive(Clone)]
pub struct McpSearchServer {
    inner: Arc<Inner>,
}

impl McpSearchServer {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()?;
        let transport = HttpTransport::new(client, config.endpoint());

        let stack = RetryLayer::new(RetryPolicy::new(config.max_retries), TransportOnly)
            .layer(TimeoutLayer::new(config.timeout).layer(transport.clone()));

        Ok(Self {
            inner: Arc::new(Inner {
                label: "exa_search".to_string(),
                config,
                transport,
                stack,
                next_id: AtomicI64::new(1),
                initialized: OnceCell::new(),
                tools_cache: RwLock::new(None),
            }),
        })
    }

    /// Same server under a different label in logs and agent listings.
    pub fn with_label(config: SearchConfig, label: impl Into<String>) -> Result<Self> {
        let mut server = Self::new(config)?;
        if let Some(inner) = Arc::get_mut(&mut server.inner) {
            inner.label = label.into();
        }
        Ok(server)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.inner.config
    }

    /// Performs the MCP handshake. Called implicitly by the first request;
    /// calling it up front surfaces connection problems at start-up.
    pub async fn connect(&self) -> Result<()> {
        self.inner
            .initialized
            .get_or_try_init(|| async {
                info!(endpoint = %self.inner.config.redacted_endpoint(), "connecting to search server");
                let result = self
                    .rpc(
                        "initialize",
                        json!({
                            "protocolVersion": PROTOCOL_VERSION,
                            "capabilities": {},
                            "clientInfo": {
                                "name": env!("CARGO_PKG_NAME"),
                                "version": env!("CARGO_PKG_VERSION")
                            }
                        }),
                    )
                    .await?;
                debug!(server = %result.get("serverInfo").cloned().unwrap_or_default(), "search server initialized");

                self.inner
                    .stack
                    .clone()
                    .oneshot(RpcCall::notification("notifications/initialized"))
                    .await
                    .map_err(into_agents_error)?;
                Ok::<(), AgentsError>(())
            })
            .await
            .map(|_| ())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .stack
            .clone()
            .oneshot(RpcCall::request(id, method, params))
            .await
            .map_err(into_agents_error)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.connect().await?;
        self.rpc(method, params).await
    }

    /// Tool definitions, cached after the first successful listing when
    /// `cache_tools_list` is set.
    pub async fn tool_definitions(&self) -> Result<Vec<McpToolDefinition>> {
        if self.inner.config.cache_tools_list {
            if let Some(cached) = self.inner.tools_cache.read().await.as_ref() {
                return Ok(cached.clone());
            }
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page = self.request("tools/list", params).await?;
            let defs: Vec<McpToolDefinition> =
                serde_json::from_value(page.get("tools").cloned().unwrap_or_else(|| json!([])))?;
            tools.extend(defs);
            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        debug!(server = %self.inner.label, tools = tools.len(), "listed remote tools");

        if self.inner.config.cache_tools_list {
            *self.inner.tools_cache.write().await = Some(tools.clone());
        }
        Ok(tools)
    }

    pub async fn invalidate_tools_cache(&self) {
        *self.inner.tools_cache.write().await = None;
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        debug!(server = %self.inner.label, tool = %name, "calling remote tool");
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Best-effort end of the remote session. Never fails.
    pub async fn close(&self) {
        if let Err(e) = self.inner.transport.delete_session().await {
            debug!(error = %e, "closing search session failed");
        }
    }
}

impl std::fmt::Debug for McpSearchServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSearchServer")
            .field("label", &self.inner.label)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[async_trait]
impl ToolServer for McpSearchServer {
    fn name(&self) -> &str {
        &self.inner.label
    }

    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        let defs = self.tool_definitions().await?;
        Ok(defs
            .into_iter()
            .map(|definition| {
                Arc::new(RemoteTool {
                    server: self.clone(),
                    definition,
                }) as Arc<dyn Tool>
            })
            .collect())
    }
}

/// A remote tool exposed to the model like any local one.
#[derive(Debug, Clone)]
pub struct RemoteTool {
    server: McpSearchServer,
    definition: McpToolDefinition,
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        self.definition.description.as_deref().unwrap_or_default()
    }

    fn parameters_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult> {
        let result = self.server.call_tool(&self.definition.name, arguments).await?;
        if result.is_error {
            let text = result.text();
            let message = if text.is_empty() {
                "remote tool reported an error".to_string()
            } else {
                text
            };
            return Ok(ToolResult::error(message));
        }

        let text = result.text();
        if text.is_empty() {
            Ok(ToolResult::success(
                result.structured_content.unwrap_or(Value::Null),
            ))
        } else {
            Ok(ToolResult::text(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn call_result_parses_mcp_shape() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "first\nsecond");
        assert_eq!(result.first_text(), Some("first"));
        assert_eq!(result.content[1], Content::Other);
    }

    #[test]
    fn tool_definition_defaults_schema() {
        let def: McpToolDefinition =
            serde_json::from_value(json!({"name": "web_search_exa"})).unwrap();
        assert_eq!(def.description, None);
        assert_eq!(def.input_schema["type"], "object");
    }

    #[test]
    fn debug_output_hides_credential() {
        let server =
            McpSearchServer::new(SearchConfig::new("https://mcp.exa.ai/mcp", "secret-key")).unwrap();
        let printed = format!("{:?}", server);
        assert!(!printed.contains("secret-key"));
        assert!(printed.contains("exaApiKey=***"));
    }
}
