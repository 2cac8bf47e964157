//! Agents exposed as tools.
//!
//! Unlike a handoff, calling an [`AgentTool`] keeps the calling agent in
//! charge: the wrapped agent runs to completion in a nested run and only its
//! final text comes back as the tool output. The nested run's own tool calls
//! and items never reach the caller's run result, session or event stream.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::Agent;
use crate::error::{AgentsError, Result};
use crate::runner::{RunConfig, Runner};
use crate::tool::{Tool, ToolContext, ToolResult};

#[derive(Clone)]
pub struct AgentTool {
    agent: Agent,
    name: String,
    description: String,
}

impl AgentTool {
    pub fn new(agent: Agent, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent,
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    fn input_from(arguments: &Value) -> Result<String> {
        match arguments {
            Value::String(s) => Ok(s.clone()),
            Value::Object(map) => map
                .get("input")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AgentsError::ToolExecutionError {
                    message: "missing 'input' argument".to_string(),
                }),
            other => Err(AgentsError::ToolExecutionError {
                message: format!("unsupported arguments: {}", other),
            }),
        }
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .finish()
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The request to pass to the agent"
                }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, arguments: Value) -> Result<ToolResult> {
        let input = Self::input_from(&arguments)?;
        debug!(tool = %self.name, agent = %self.agent.name(), "running nested agent");

        let config = RunConfig::new(ctx.provider.clone());
        let result = Runner::run(self.agent.clone(), input, config)
            .await?
            .into_result()?;
        Ok(ToolResult::text(result.final_output))
    }
}
