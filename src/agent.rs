//! # Agent (orientation)
//!
//! An `Agent` is a named, instruction-bound participant: instructions, local
//! tools, remote tool servers, handoff targets and input guardrails. Agents are
//! assembled once at start-up with the `with_*` builder methods and are not
//! mutated afterwards; the runner only reads them.

use std::sync::Arc;

use crate::agent_tool::AgentTool;
use crate::guardrail::InputGuardrail;
use crate::handoff::Handoff;
use crate::items::Message;
use crate::search::ToolServer;
use crate::tool::Tool;

/// Defines the complete configuration for an [`Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// The name of the agent, used for identification, logs and handoff tool names.
    pub name: String,

    /// System instructions. Workflow ordering lives here, as prose for the model.
    pub instructions: String,

    /// Shown to other agents when this agent is a handoff target.
    pub handoff_description: Option<String>,

    /// Local tools, in the order they are advertised.
    pub tools: Vec<Arc<dyn Tool>>,

    /// Remote tool servers whose tools are listed at the start of each run.
    pub tool_servers: Vec<Arc<dyn ToolServer>>,

    /// Agents this agent may hand control to.
    pub handoffs: Vec<Handoff>,

    /// Checks run against the raw input before the agent does anything.
    pub input_guardrails: Vec<Arc<dyn InputGuardrail>>,

    /// Optional per-agent model override.
    pub model: Option<String>,

    pub max_turns: Option<usize>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,

    /// JSON schema the final answer must follow (structured output).
    pub output_schema: Option<serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".to_string(),
            instructions: "You are a helpful assistant.".to_string(),
            handoff_description: None,
            tools: vec![],
            tool_servers: vec![],
            handoffs: vec![],
            input_guardrails: vec![],
            model: None,
            max_turns: Some(10),
            temperature: None,
            max_tokens: None,
            output_schema: None,
        }
    }
}

/// A language-model driven agent.
///
/// ```rust
/// use nutrition_agents::Agent;
///
/// let planner = Agent::simple(
///     "Breakfast Planner Assistant",
///     "You help with healthy breakfast choices.",
/// )
/// .with_temperature(0.3);
///
/// assert_eq!(planner.name(), "Breakfast Planner Assistant");
/// assert!(!planner.has_tools());
/// ```
#[derive(Clone)]
pub struct Agent {
    pub config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// An agent with just a name and instructions; everything else defaulted.
    pub fn simple(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self::new(AgentConfig {
            name: name.into(),
            instructions: instructions.into(),
            ..Default::default()
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.config.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    pub fn with_tool_server(mut self, server: Arc<dyn ToolServer>) -> Self {
        self.config.tool_servers.push(server);
        self
    }

    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.config.handoffs.push(handoff);
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.config.handoff_description = Some(description.into());
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: Arc<dyn InputGuardrail>) -> Self {
        self.config.input_guardrails.push(guardrail);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.config.max_turns = Some(max_turns);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.config.output_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn instructions(&self) -> &str {
        &self.config.instructions
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.config.tools
    }

    pub fn tool_servers(&self) -> &[Arc<dyn ToolServer>] {
        &self.config.tool_servers
    }

    pub fn handoffs(&self) -> &[Handoff] {
        &self.config.handoffs
    }

    pub fn has_tools(&self) -> bool {
        !self.config.tools.is_empty() || !self.config.tool_servers.is_empty()
    }

    pub fn is_guarded(&self) -> bool {
        !self.config.input_guardrails.is_empty()
    }

    /// System message sent at the start of every model call.
    ///
    /// Tools are advertised through the API, so only handoff targets are listed
    /// here, giving the model the descriptions it needs to pick one.
    pub fn build_system_message(&self) -> Message {
        let mut content = self.config.instructions.trim().to_string();
        if !self.config.handoffs.is_empty() {
            content.push_str("\n\nYou can hand off to the following agents:\n");
            for handoff in &self.config.handoffs {
                content.push_str(&format!(
                    "- {} ({}): {}\n",
                    handoff.agent().name(),
                    handoff.tool_name,
                    handoff.description
                ));
            }
        }
        Message::system(content)
    }

    /// Wraps this agent as a tool that runs it to completion and returns only
    /// its final text.
    pub fn as_tool(&self, name: impl Into<String>, description: impl Into<String>) -> AgentTool {
        AgentTool::new(self.clone(), name, description)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("tools", &self.config.tools.len())
            .field("tool_servers", &self.config.tool_servers.len())
            .field("handoffs", &self.config.handoffs.len())
            .field("input_guardrails", &self.config.input_guardrails.len())
            .finish()
    }
}
