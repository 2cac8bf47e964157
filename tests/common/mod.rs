//! Shared fixtures for the integration tests: a scripted MCP server on a
//! local socket, a deterministic embedder and a small calories table.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use nutrition_agents::knowledge::{parse_calories_csv, Embedder, SqliteNutritionStore};
use nutrition_agents::{FunctionTool, SearchConfig, Tool, ToolServer};

pub const CALORIES_CSV: &str = "\
FoodCategory,FoodItem,per100grams,Cals_per100grams,KJ_per100grams
Poultry,chicken breast,100g,165 cal,693 kJ
Fruits,Apple,100g,52 cal,218 kJ
Pasta&Rice,Rice,100g,130 cal,546 kJ
Dairy&EggProducts,Egg,100g,155 cal,651 kJ
";

const VOCAB: [&str; 4] = ["chicken", "apple", "rice", "egg"];

/// Bag-of-words embedder over a fixed vocabulary.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> nutrition_agents::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// In-memory store loaded with [`CALORIES_CSV`].
pub async fn calorie_store() -> SqliteNutritionStore {
    let store = SqliteNutritionStore::new_in_memory("nutrition_db", Arc::new(KeywordEmbedder))
        .await
        .expect("open store");
    let records = parse_calories_csv(CALORIES_CSV).expect("parse csv");
    store.add_records(&records).await.expect("index records");
    store
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn rpc_method(&self) -> Option<&str> {
        self.body.get("method").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponseSpec {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl HttpResponseSpec {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    /// One SSE event carrying `body`, the way streamable HTTP servers reply.
    pub fn sse(body: Value) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: format!("event: message\ndata: {}\n\n", body),
            headers: Vec::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
            headers: Vec::new(),
        }
    }

    pub fn accepted() -> Self {
        Self::text(202, "")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(headers: &[(String, String)]) -> usize {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0)
}

async fn read_request(stream: &mut TcpStream) -> Option<HttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    let end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&buf) {
            break end;
        }
    };

    let head = std::str::from_utf8(&buf[..end]).ok()?.to_string();
    let mut lines = head.lines();
    let method = lines.next()?.split_whitespace().next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect();
    let body_len = content_length(&headers);

    while buf.len() < end + body_len {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = serde_json::from_slice(&buf[end..end + body_len]).unwrap_or(Value::Null);
    Some(HttpRequest {
        method,
        headers,
        body,
    })
}

pub type Handler = Arc<dyn Fn(&HttpRequest) -> HttpResponseSpec + Send + Sync>;

/// Serves `handler` on a fresh local port. Every request is recorded.
pub struct MockHttpServer {
    pub url: String,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockHttpServer {
    pub async fn spawn(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind http listener");
        let addr = listener.local_addr().expect("listener addr");
        let requests: Arc<Mutex<Vec<HttpRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    log.lock().expect("requests lock").push(request.clone());
                    let response = handler(&request);
                    let mut head = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                        response.status,
                        status_text(response.status),
                        response.content_type,
                        response.body.as_bytes().len()
                    );
                    for (k, v) in &response.headers {
                        head.push_str(&format!("{}: {}\r\n", k, v));
                    }
                    head.push_str("\r\n");
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(response.body.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            url: format!("http://{}/mcp", addr),
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn rpc_methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| match r.rpc_method() {
                Some(m) => m.to_string(),
                None => r.method.clone(),
            })
            .collect()
    }

    pub fn config(&self, api_key: &str) -> SearchConfig {
        SearchConfig::new(&self.url, api_key).with_timeout(std::time::Duration::from_secs(5))
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub const SESSION_ID: &str = "session-test-1";

pub fn rpc_result(request: &HttpRequest, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request.body["id"].clone(),
        "result": result
    })
}

pub fn search_tool_definitions() -> Value {
    json!({
        "tools": [{
            "name": "web_search_exa",
            "description": "Search the web",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        }]
    })
}

/// A well-behaved MCP server: handshake, a single search tool, and
/// `on_call` answering `tools/call` with the `result` object to send.
pub fn mcp_handler<F>(on_call: F) -> Handler
where
    F: Fn(&HttpRequest) -> Value + Send + Sync + 'static,
{
    Arc::new(move |request: &HttpRequest| match request.rpc_method() {
        Some("initialize") => HttpResponseSpec::json(rpc_result(
            request,
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "mock-search", "version": "0.0.1"}
            }),
        ))
        .with_header("Mcp-Session-Id", SESSION_ID),
        Some("notifications/initialized") => HttpResponseSpec::accepted(),
        Some("tools/list") => {
            HttpResponseSpec::json(rpc_result(request, search_tool_definitions()))
        }
        Some("tools/call") => HttpResponseSpec::json(rpc_result(request, on_call(request))),
        _ if request.method == "DELETE" => HttpResponseSpec::text(200, ""),
        _ => HttpResponseSpec::text(400, "unexpected request"),
    })
}

pub fn text_content(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

pub fn search_results(titles: &[&str]) -> Value {
    let results: Vec<Value> = titles
        .iter()
        .map(|t| json!({"title": t, "url": format!("https://example.com/{}", t)}))
        .collect();
    text_content(&json!({ "results": results }).to_string())
}

/// Search server stand-in that answers every query with `answer` and counts
/// how often its tools were listed.
pub struct StaticSearchServer {
    answer: String,
    pub listings: AtomicUsize,
}

impl StaticSearchServer {
    pub fn new(answer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.into(),
            listings: AtomicUsize::new(0),
        })
    }

    pub fn listing_count(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServer for StaticSearchServer {
    fn name(&self) -> &str {
        "static_search"
    }

    async fn list_tools(&self) -> nutrition_agents::Result<Vec<Arc<dyn Tool>>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.clone();
        let tool = FunctionTool::new(
            "web_search_exa",
            "Search the web",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            move |_args| {
                let answer = answer.clone();
                async move { Ok(Value::String(answer)) }
            },
        );
        Ok(vec![Arc::new(tool)])
    }
}
