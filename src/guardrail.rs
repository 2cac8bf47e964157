//! # Input guardrails
//!
//! A guarded agent's run starts in [`GateState::Pending`]. Every input
//! guardrail is checked against the raw user input, in descending priority,
//! before the agent makes its first model call. The gate ends `Passed` or
//! `Tripped`; a tripped gate ends the run with no tool call and no handoff.
//!
//! [`AgentGuardrail`] delegates the decision to a classifier agent with a
//! structured output, which is how the food-topic policy is expressed:
//!
//! ```rust
//! use nutrition_agents::guardrail::{food_topic_guardrail, InputGuardrail};
//! use nutrition_agents::Agent;
//!
//! let classifier = Agent::simple("Guardrail check", "Is the input only about food?");
//! let guardrail = food_topic_guardrail(classifier);
//! assert_eq!(guardrail.name(), "food_topic_guardrail");
//! ```

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::error::{AgentsError, Result};
use crate::runner::{RunConfig, Runner};
use crate::tool::{schema_value, ToolContext};

/// Outcome of one guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub tripwire_triggered: bool,
    pub reason: Option<String>,
    /// Whatever the guardrail produced while deciding, e.g. the classifier output
    pub output_info: Option<Value>,
}

impl GuardrailResult {
    pub fn pass() -> Self {
        Self {
            tripwire_triggered: false,
            reason: None,
            output_info: None,
        }
    }

    pub fn trip(reason: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: true,
            reason: Some(reason.into()),
            output_info: None,
        }
    }

    pub fn with_output_info(mut self, info: Value) -> Self {
        self.output_info = Some(info);
        self
    }
}

/// Trait for input guardrails that validate user input before processing.
#[async_trait]
pub trait InputGuardrail: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    async fn check(&self, ctx: &ToolContext, input: &str) -> Result<GuardrailResult>;
}

/// Progress of the guardrail gate for one run.
#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Pending,
    Passed,
    Tripped {
        guardrail: String,
        reason: String,
        output_info: Option<Value>,
    },
}

impl GateState {
    pub fn is_tripped(&self) -> bool {
        matches!(self, GateState::Tripped { .. })
    }
}

/// Executes guardrails in descending priority order.
pub struct GuardrailRunner;

impl GuardrailRunner {
    /// Runs every guardrail until one trips. Always resolves the gate: the
    /// returned state is never `Pending`. A guardrail that fails to produce a
    /// verdict is an error and the run does not proceed.
    pub async fn check_input(
        guards: &[Arc<dyn InputGuardrail>],
        ctx: &ToolContext,
        input: &str,
    ) -> Result<GateState> {
        let mut guards = guards.to_vec();
        guards.sort_by_key(|g| -g.priority());

        debug!(guardrails = guards.len(), state = ?GateState::Pending, "guardrail gate opened");
        for g in guards {
            let res = g.check(ctx, input).await?;
            if res.tripwire_triggered {
                let state = GateState::Tripped {
                    guardrail: g.name().to_string(),
                    reason: res.reason.unwrap_or_else(|| g.name().to_string()),
                    output_info: res.output_info,
                };
                info!(guardrail = %g.name(), "🚫 input guardrail tripped");
                return Ok(state);
            }
        }
        debug!(state = ?GateState::Passed, "guardrail gate closed");
        Ok(GateState::Passed)
    }
}

/// Guardrail decided by a classifier agent with structured output `T`.
pub struct AgentGuardrail<T> {
    name: String,
    agent: Agent,
    tripwire: Arc<dyn Fn(&T) -> bool + Send + Sync>,
    reason: String,
    _output: PhantomData<fn() -> T>,
}

impl<T> AgentGuardrail<T>
where
    T: DeserializeOwned + JsonSchema + Serialize + Send + Sync + 'static,
{
    /// `tripwire` returns true when the classified input must be rejected.
    /// The agent is given `T`'s schema as its output schema unless it already has one.
    pub fn new<F>(name: impl Into<String>, agent: Agent, tripwire: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let agent = if agent.config.output_schema.is_some() {
            agent
        } else {
            agent.with_output_schema(schema_value::<T>())
        };
        let name = name.into();
        Self {
            reason: format!("input rejected by {}", name),
            name,
            agent,
            tripwire: Arc::new(tripwire),
            _output: PhantomData,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    fn parse_output(&self, text: &str) -> Result<T> {
        serde_json::from_str(strip_code_fence(text)).map_err(|e| AgentsError::ModelBehaviorError {
            message: format!(
                "guardrail '{}' produced output that does not match its schema: {}",
                self.name, e
            ),
        })
    }
}

#[async_trait]
impl<T> InputGuardrail for AgentGuardrail<T>
where
    T: DeserializeOwned + JsonSchema + Serialize + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &ToolContext, input: &str) -> Result<GuardrailResult> {
        let config = RunConfig::new(ctx.provider.clone());
        let result = Runner::run(self.agent.clone(), input, config)
            .await?
            .into_result()?;

        let verdict = self.parse_output(&result.final_output)?;
        let info = serde_json::to_value(&verdict)?;
        debug!(guardrail = %self.name, verdict = %info, "classifier verdict");

        if (self.tripwire)(&verdict) {
            Ok(GuardrailResult::trip(self.reason.clone()).with_output_info(info))
        } else {
            Ok(GuardrailResult::pass().with_output_info(info))
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Structured output of the food-topic classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FoodTopicCheck {
    pub only_about_food: bool,
}

/// Trips when the classifier says the input is not only about food.
pub fn food_topic_guardrail(classifier: Agent) -> AgentGuardrail<FoodTopicCheck> {
    AgentGuardrail::new("food_topic_guardrail", classifier, |check: &FoodTopicCheck| {
        !check.only_about_food
    })
    .with_reason("the request is not only about food")
}
