//! Checks that the search server is reachable and answers a real query.
//!
//! Exits 0 on success and 1 otherwise. Needs only `EXA_API_KEY`
//! (and optionally `EXA_MCP_URL`).

use std::process::ExitCode;

use nutrition_agents::search::{check_connectivity, ConnectivityStatus};
use nutrition_agents::SearchConfig;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    nutrition_agents::init_tracing();

    let config = match SearchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Endpoint: {}", config.redacted_endpoint());
    let report = check_connectivity(&config).await;

    if !report.tools_listed.is_empty() {
        println!("Tools: {}", report.tools_listed.join(", "));
    }
    match report.status {
        ConnectivityStatus::Success => {
            println!("OK: {}", report.detail);
            ExitCode::SUCCESS
        }
        ConnectivityStatus::ApplicationFailure => {
            println!("Server answered with an error: {}", report.detail);
            ExitCode::FAILURE
        }
        ConnectivityStatus::TransportFailure => {
            println!("Could not reach the server: {}", report.detail);
            ExitCode::FAILURE
        }
    }
}
