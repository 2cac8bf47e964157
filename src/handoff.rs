//! # Agent handoffs
//!
//! A handoff is advertised to the model as a tool named
//! `transfer_to_<target_agent>`. When the model calls it, the runner switches
//! the active agent for the rest of the run. Control never returns to the agent
//! that handed off, and the target's answer becomes the run's final output.
//!
//! ```rust
//! use nutrition_agents::{Agent, Handoff};
//!
//! let price_checker = Agent::simple(
//!     "Breakfast Price Checker Assistant",
//!     "Look up approximate ingredient prices.",
//! );
//! let advisor = Agent::simple("Breakfast Advisor", "Plan breakfasts, then hand off.")
//!     .with_handoff(Handoff::new(price_checker));
//!
//! assert_eq!(
//!     advisor.handoffs()[0].tool_name,
//!     "transfer_to_breakfast_price_checker_assistant"
//! );
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::Result;
use crate::tool::{Tool, ToolContext, ToolResult};

/// A handoff target.
#[derive(Clone)]
pub struct Handoff {
    /// Tool name the model calls to trigger the handoff
    pub tool_name: String,

    /// Shown to the model to help it decide when to hand off
    pub description: String,

    pub agent: Arc<Agent>,
}

impl Handoff {
    /// Handoff to `agent`, described by its `handoff_description` when it has one.
    pub fn new(agent: Agent) -> Self {
        let mut description = format!(
            "Handoff to the {} agent to handle the request.",
            agent.name()
        );
        if let Some(extra) = &agent.config.handoff_description {
            description.push(' ');
            description.push_str(extra.trim());
        }
        Self {
            tool_name: transfer_tool_name(agent.name()),
            description,
            agent: Arc::new(agent),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("target", &self.agent.name())
            .finish()
    }
}

/// `"Breakfast Price Checker Assistant"` → `"transfer_to_breakfast_price_checker_assistant"`
pub fn transfer_tool_name(agent_name: &str) -> String {
    let mut slug = String::with_capacity(agent_name.len());
    for ch in agent_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!("transfer_to_{}", slug.trim_end_matches('_'))
}

/// Arguments the model may pass when handing off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffArgs {
    pub reason: Option<String>,
}

/// Exposes a [`Handoff`] to the model as a tool.
///
/// The runner intercepts calls to it before tool dispatch, so `execute` only
/// produces the acknowledgement the model sees.
#[derive(Clone, Debug)]
pub struct HandoffTool {
    handoff: Handoff,
}

impl From<Handoff> for HandoffTool {
    fn from(h: Handoff) -> Self {
        Self { handoff: h }
    }
}

impl HandoffTool {
    pub fn acknowledgement(&self) -> Value {
        serde_json::json!({ "assistant": self.handoff.agent.name() })
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.handoff.tool_name
    }

    fn description(&self) -> &str {
        &self.handoff.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "description": "Why control is being handed off"}
            }
        })
    }

    async fn execute(&self, _ctx: &ToolContext, _arguments: Value) -> Result<ToolResult> {
        Ok(ToolResult::success(self.acknowledgement()))
    }
}
