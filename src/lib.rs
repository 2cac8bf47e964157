//! # Nutrition agents
//!
//! A small multi-agent system for food questions, built on `async-openai` and
//! Tower:
//!
//! - **Agents** are immutable bundles of instructions, tools, remote tool
//!   servers, handoff targets and input guardrails.
//! - **Tools** are called by name from a per-run registry: local functions,
//!   the calorie lookup over an embedded SQLite knowledge base, remote MCP
//!   search tools, and whole agents wrapped as tools.
//! - **Guardrails** resolve before a guarded agent does anything; a tripped
//!   guardrail ends the run as [`RunOutcome::GuardrailTripped`], not as an error.
//! - **Handoffs** pass control one way to another agent, whose answer becomes
//!   the final output.
//!
//! Credentials are read from the environment once into an [`AppConfig`].
//!
//! ```rust,no_run
//! use nutrition_agents::{AgentPrompts, AppConfig, NutritionAgents, RunConfig, RunOutcome, Runner};
//! use nutrition_agents::knowledge::{CalorieLookupTool, OpenAIEmbedder, SqliteNutritionStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> nutrition_agents::Result<()> {
//! let config = AppConfig::from_env()?;
//! let embedder = Arc::new(OpenAIEmbedder::new(
//!     config.openai_client(),
//!     &config.store.embedding_model,
//! ));
//! let store = SqliteNutritionStore::open(
//!     &config.store.nutrition_db_path,
//!     &config.store.collection,
//!     embedder,
//! )
//! .await?;
//! let lookup = Arc::new(CalorieLookupTool::new(Arc::new(store)));
//!
//! let agents = NutritionAgents::build(&AgentPrompts::embedded()?, lookup, None);
//! let outcome = Runner::run(
//!     agents.simple_calorie_agent.clone(),
//!     "How many calories in 100g of chicken breast?",
//!     RunConfig::new(config.provider()),
//! )
//! .await?;
//!
//! match outcome {
//!     RunOutcome::Completed(result) => println!("{}", result.final_output),
//!     RunOutcome::GuardrailTripped(trip) => println!("refused: {}", trip.reason),
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_tool;
pub mod config;
pub mod error;
pub mod guardrail;
pub mod handoff;
pub mod items;
pub mod knowledge;
pub mod memory;
pub mod model;
pub mod nutrition;
pub mod resilience;
pub mod result;
pub mod runner;
pub mod search;
pub mod sqlite_session;
pub mod streaming;
pub mod tool;
pub mod usage;

pub use agent::{Agent, AgentConfig};
pub use agent_tool::AgentTool;
pub use config::{AppConfig, SearchConfig, StoreConfig};
pub use error::{AgentsError, Result};
pub use guardrail::{FoodTopicCheck, GateState, GuardrailResult, InputGuardrail};
pub use handoff::Handoff;
pub use memory::{InMemorySession, Session};
pub use model::{MockProvider, ModelProvider, OpenAIProvider};
pub use nutrition::{AgentPrompts, NutritionAgents};
pub use result::{GuardrailTrip, RunOutcome, RunResult};
pub use runner::{RunConfig, Runner};
pub use search::{McpSearchServer, ToolServer};
pub use sqlite_session::SqliteSession;
pub use streaming::{RunEvent, RunEventStream};
pub use tool::{FunctionTool, Tool, ToolContext, ToolResult};

/// Installs the `tracing` subscriber used by the binaries.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
