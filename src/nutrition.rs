//! # The nutrition agent graph
//!
//! Every agent the front ends use, wired from an [`AgentPrompts`] asset:
//!
//! ```text
//! breakfast_advisor ──tool──▶ breakfast-planner   (Breakfast Planner Assistant)
//!        │          ──tool──▶ calorie-calculator  (Nutrition Assistant: lookup + search)
//!        └──handoff──▶ Breakfast Price Checker Assistant (search)
//! ```
//!
//! The guarded variants additionally run `food_topic_guardrail` (backed by the
//! `Guardrail check` classifier) before doing anything else. The order in
//! which the advisor uses its tools is stated only in its instructions.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::agent::Agent;
use crate::error::Result;
use crate::guardrail::{food_topic_guardrail, FoodTopicCheck};
use crate::handoff::Handoff;
use crate::search::ToolServer;
use crate::tool::{schema_value, Tool};

const EMBEDDED_PROMPTS: &str = include_str!("../assets/agents.toml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompt {
    pub name: String,
    pub instructions: String,
    #[serde(default)]
    pub handoff_description: Option<String>,
}

impl AgentPrompt {
    fn agent(&self) -> Agent {
        let agent = Agent::simple(&self.name, &self.instructions);
        match &self.handoff_description {
            Some(d) => agent.with_handoff_description(d.trim()),
            None => agent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPrompt {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPrompts {
    pub breakfast_planner: ToolPrompt,
    pub calorie_calculator: ToolPrompt,
}

/// Names, instructions and tool descriptions for the whole graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPrompts {
    pub simple_calorie_agent: AgentPrompt,
    pub calorie_agent: AgentPrompt,
    pub calorie_agent_guarded: AgentPrompt,
    pub breakfast_planner: AgentPrompt,
    pub price_checker: AgentPrompt,
    pub breakfast_advisor: AgentPrompt,
    pub breakfast_advisor_guarded: AgentPrompt,
    pub guardrail: AgentPrompt,
    pub tools: ToolPrompts,
}

impl AgentPrompts {
    /// The prompts shipped with the crate.
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_PROMPTS)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// `path` when given, the embedded asset otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                info!(path = %p.display(), "loading agent prompts");
                Self::from_file(p)
            }
            None => Self::embedded(),
        }
    }
}

/// The assembled agents. Built once; cloning an agent is cheap.
#[derive(Clone)]
pub struct NutritionAgents {
    /// Knowledge lookup only
    pub simple_calorie_agent: Agent,
    /// Knowledge lookup plus web search
    pub calorie_agent: Agent,
    pub calorie_agent_guarded: Agent,
    pub breakfast_planner: Agent,
    pub price_checker: Agent,
    /// Classifier behind the food-topic guardrail
    pub guardrail_agent: Agent,
    pub breakfast_planner_tool: Arc<dyn Tool>,
    pub calorie_calculator_tool: Arc<dyn Tool>,
    pub breakfast_advisor: Agent,
    pub breakfast_advisor_guarded: Agent,
}

impl NutritionAgents {
    /// Wires the graph. Without a search server the agents that would search
    /// simply have no search tools.
    pub fn build(
        prompts: &AgentPrompts,
        lookup_tool: Arc<dyn Tool>,
        search: Option<Arc<dyn ToolServer>>,
    ) -> Self {
        let with_search = |agent: Agent| match &search {
            Some(server) => agent.with_tool_server(server.clone()),
            None => agent,
        };

        let guardrail_agent = prompts
            .guardrail
            .agent()
            .with_output_schema(schema_value::<FoodTopicCheck>());
        let food_guardrail = Arc::new(food_topic_guardrail(guardrail_agent.clone()));

        let simple_calorie_agent = prompts
            .simple_calorie_agent
            .agent()
            .with_tool(lookup_tool.clone());

        let calorie_agent = with_search(prompts.calorie_agent.agent().with_tool(lookup_tool.clone()));
        let calorie_agent_guarded = with_search(
            prompts
                .calorie_agent_guarded
                .agent()
                .with_tool(lookup_tool)
                .with_input_guardrail(food_guardrail.clone()),
        );

        let breakfast_planner = prompts.breakfast_planner.agent();
        let price_checker = with_search(prompts.price_checker.agent());

        let breakfast_planner_tool: Arc<dyn Tool> = Arc::new(breakfast_planner.as_tool(
            &prompts.tools.breakfast_planner.name,
            &prompts.tools.breakfast_planner.description,
        ));
        let calorie_calculator_tool: Arc<dyn Tool> = Arc::new(calorie_agent.as_tool(
            &prompts.tools.calorie_calculator.name,
            &prompts.tools.calorie_calculator.description,
        ));

        let breakfast_advisor = prompts
            .breakfast_advisor
            .agent()
            .with_tools(vec![
                breakfast_planner_tool.clone(),
                calorie_calculator_tool.clone(),
            ])
            .with_handoff(Handoff::new(price_checker.clone()));
        let breakfast_advisor_guarded = prompts
            .breakfast_advisor_guarded
            .agent()
            .with_tools(vec![
                breakfast_planner_tool.clone(),
                calorie_calculator_tool.clone(),
            ])
            .with_handoff(Handoff::new(price_checker.clone()))
            .with_input_guardrail(food_guardrail);

        Self {
            simple_calorie_agent,
            calorie_agent,
            calorie_agent_guarded,
            breakfast_planner,
            price_checker,
            guardrail_agent,
            breakfast_planner_tool,
            calorie_calculator_tool,
            breakfast_advisor,
            breakfast_advisor_guarded,
        }
    }

    /// The default agent of the chat front end.
    pub fn nutrition_agent(&self) -> Agent {
        self.calorie_agent_guarded.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentsError;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;

    fn lookup() -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            "calorie_lookup_tool",
            "lookup",
            serde_json::json!({"type": "object"}),
            |_| async { Ok(serde_json::json!("Nutrition Information:")) },
        ))
    }

    #[test]
    fn test_embedded_prompts_parse() {
        let prompts = AgentPrompts::embedded().unwrap();
        assert_eq!(prompts.calorie_agent.name, "Nutrition Assistant");
        assert_eq!(prompts.price_checker.name, "Breakfast Price Checker Assistant");
        assert_eq!(prompts.tools.calorie_calculator.name, "calorie-calculator");
        assert!(prompts
            .calorie_agent_guarded
            .instructions
            .contains("You only answer questions about food."));
        assert!(prompts.breakfast_advisor.handoff_description.is_some());
    }

    #[test]
    fn test_graph_wiring() {
        let prompts = AgentPrompts::embedded().unwrap();
        let agents = NutritionAgents::build(&prompts, lookup(), None);

        assert!(!agents.simple_calorie_agent.is_guarded());
        assert!(agents.calorie_agent_guarded.is_guarded());
        assert!(agents.breakfast_advisor_guarded.is_guarded());
        assert!(!agents.breakfast_advisor.is_guarded());
        assert!(agents.guardrail_agent.config.output_schema.is_some());

        let tool_names: Vec<&str> = agents
            .breakfast_advisor
            .tools()
            .iter()
            .map(|t| t.name())
            .collect();
        assert_eq!(tool_names, vec!["breakfast-planner", "calorie-calculator"]);

        let handoffs = agents.breakfast_advisor.handoffs();
        assert_eq!(handoffs.len(), 1);
        assert_eq!(
            handoffs[0].agent().name(),
            "Breakfast Price Checker Assistant"
        );
        assert_eq!(agents.nutrition_agent().name(), "Nutrition Assistant");
        assert!(agents.nutrition_agent().is_guarded());
    }

    #[test]
    fn test_prompt_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.toml");
        let custom = EMBEDDED_PROMPTS.replace("Breakfast Advisor", "Morning Coach");
        std::fs::write(&path, custom).unwrap();

        let prompts = AgentPrompts::load(Some(&path)).unwrap();
        assert_eq!(prompts.breakfast_advisor.name, "Morning Coach");

        std::fs::write(&path, "[guardrail]\nname = 1").unwrap();
        let err = AgentPrompts::load(Some(&path)).unwrap_err();
        assert!(matches!(err, AgentsError::PromptAssetError(_)));
    }
}
