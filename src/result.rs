//! Result types for agent execution

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentsError, Result};
use crate::items::{HandoffItem, ItemHelpers, RunItem, ToolCallItem};
use crate::usage::UsageStats;

/// A run that reached a final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Final text of the last active agent
    pub final_output: String,
    /// Everything recorded during the run, in order
    pub items: Vec<RunItem>,
    /// Agent that produced the final output (differs from the starting agent after a handoff)
    pub last_agent: String,
    pub usage: UsageStats,
    pub trace_id: String,
}

impl RunResult {
    pub fn tool_calls(&self) -> Vec<&ToolCallItem> {
        ItemHelpers::tool_calls(&self.items)
    }

    pub fn handoffs(&self) -> Vec<&HandoffItem> {
        ItemHelpers::handoffs(&self.items)
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls().len()
    }

    pub fn handoff_count(&self) -> usize {
        self.handoffs().len()
    }

    /// Parses the final output as JSON (for agents with an output schema).
    pub fn final_output_json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.final_output)?)
    }
}

/// A run stopped by an input guardrail before doing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailTrip {
    pub agent: String,
    pub guardrail: String,
    pub reason: String,
    pub output_info: Option<Value>,
    pub trace_id: String,
}

/// How a run ended.
///
/// A guardrail trip is a deliberate policy outcome, not an error, so it is
/// reported here rather than through [`AgentsError`].
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunResult),
    GuardrailTripped(GuardrailTrip),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn is_guardrail_tripped(&self) -> bool {
        matches!(self, RunOutcome::GuardrailTripped(_))
    }

    pub fn completed(&self) -> Option<&RunResult> {
        match self {
            RunOutcome::Completed(r) => Some(r),
            RunOutcome::GuardrailTripped(_) => None,
        }
    }

    pub fn trip(&self) -> Option<&GuardrailTrip> {
        match self {
            RunOutcome::GuardrailTripped(t) => Some(t),
            RunOutcome::Completed(_) => None,
        }
    }

    /// For callers that can only continue with a completed run.
    pub fn into_result(self) -> Result<RunResult> {
        match self {
            RunOutcome::Completed(r) => Ok(r),
            RunOutcome::GuardrailTripped(t) => Err(AgentsError::InputGuardrailTriggered {
                guardrail: t.guardrail,
                message: t.reason,
            }),
        }
    }
}
