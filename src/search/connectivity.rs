//! Smoke test for the search endpoint.
//!
//! Connects, lists tools and runs one real search. The report separates a
//! server that could not be reached from one that answered with a failure,
//! which is how a rejected credential shows up.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{CallToolResult, McpSearchServer};
use crate::config::SearchConfig;
use crate::error::{AgentsError, Result};

pub const PROBE_TOOL: &str = "web_search_exa";
pub const PROBE_QUERY: &str = "Python programming";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityStatus {
    Success,
    /// The server answered, but the answer was an error or had no results
    ApplicationFailure,
    /// The server could not be reached or its reply could not be read
    TransportFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityReport {
    pub status: ConnectivityStatus,
    pub tools_listed: Vec<String>,
    /// Number of search results returned by the probe query
    pub results: usize,
    pub detail: String,
}

impl ConnectivityReport {
    pub fn is_success(&self) -> bool {
        self.status == ConnectivityStatus::Success
    }

    fn failed(error: &AgentsError, tools_listed: Vec<String>) -> Self {
        let status = match error {
            AgentsError::ApplicationError { .. } => ConnectivityStatus::ApplicationFailure,
            _ => ConnectivityStatus::TransportFailure,
        };
        Self {
            status,
            tools_listed,
            results: 0,
            detail: error.to_string(),
        }
    }
}

/// Runs the probe against `config`. Never returns an error: every failure is
/// classified in the report. The session is closed on every path.
pub async fn check_connectivity(config: &SearchConfig) -> ConnectivityReport {
    info!(endpoint = %config.redacted_endpoint(), "checking search connectivity");
    let server = match McpSearchServer::new(config.clone()) {
        Ok(server) => server,
        Err(e) => return ConnectivityReport::failed(&e, Vec::new()),
    };

    let mut tools_listed = Vec::new();
    let report = match probe(&server, &mut tools_listed).await {
        Ok(result) => evaluate(&result, tools_listed),
        Err(e) => ConnectivityReport::failed(&e, tools_listed),
    };
    server.close().await;

    if report.is_success() {
        info!(results = report.results, "search connectivity ok");
    } else {
        warn!(status = ?report.status, detail = %report.detail, "search connectivity failed");
    }
    report
}

async fn probe(server: &McpSearchServer, tools_listed: &mut Vec<String>) -> Result<CallToolResult> {
    server.connect().await?;
    let tools = server.tool_definitions().await?;
    tools_listed.extend(tools.into_iter().map(|t| t.name));
    server
        .call_tool(PROBE_TOOL, json!({ "query": PROBE_QUERY }))
        .await
}

/// Classifies a `tools/call` answer.
pub(crate) fn evaluate(result: &CallToolResult, tools_listed: Vec<String>) -> ConnectivityReport {
    let report = |status, results, detail: String| ConnectivityReport {
        status,
        tools_listed: tools_listed.clone(),
        results,
        detail,
    };

    if result.is_error {
        let text = result.text();
        return report(
            ConnectivityStatus::ApplicationFailure,
            0,
            if text.is_empty() {
                "tool call reported an error".to_string()
            } else {
                text
            },
        );
    }

    let payload = result.structured_content.clone().or_else(|| {
        result
            .first_text()
            .and_then(|t| serde_json::from_str::<Value>(t).ok())
    });

    let Some(payload) = payload else {
        let text = result.text();
        return if text.trim().is_empty() {
            report(
                ConnectivityStatus::ApplicationFailure,
                0,
                "empty response".to_string(),
            )
        } else {
            report(ConnectivityStatus::Success, 1, "text response".to_string())
        };
    };

    if let Some(error) = payload.get("error") {
        let detail = error
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return report(ConnectivityStatus::ApplicationFailure, 0, detail);
    }
    if payload.get("success") == Some(&Value::Bool(false)) {
        return report(
            ConnectivityStatus::ApplicationFailure,
            0,
            "server reported success = false".to_string(),
        );
    }

    match payload.get("results").and_then(Value::as_array) {
        Some(results) if !results.is_empty() => report(
            ConnectivityStatus::Success,
            results.len(),
            format!("{} results", results.len()),
        ),
        _ => report(
            ConnectivityStatus::ApplicationFailure,
            0,
            "no results".to_string(),
        ),
    }
}
