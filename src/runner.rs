//! # Runner
//!
//! `Runner` drives one run of an agent:
//!
//! 1. the input guardrail gate of the starting agent resolves (`Passed` or
//!    `Tripped`) before anything else happens;
//! 2. history from the session (if any) is loaded and the user input appended;
//! 3. the turn loop asks the model for the next step, executes requested tools
//!    one after another, and follows at most one-way handoffs until an agent
//!    answers without tool calls;
//! 4. the session gets the new items only when the run completes.
//!
//! The runner is stateless; everything a run needs comes from [`RunConfig`].

use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::Agent;
use crate::error::{AgentsError, Result};
use crate::guardrail::{GateState, GuardrailRunner};
use crate::handoff::{Handoff, HandoffTool};
use crate::items::{
    HandoffItem, Message, ModelResponse, Role, RunItem, ToolCall, ToolCallItem, ToolOutputItem,
};
use crate::memory::Session;
use crate::model::{ModelProvider, ModelRequest};
use crate::result::{GuardrailTrip, RunOutcome, RunResult};
use crate::streaming::{RunEvent, RunEventStream};
use crate::tool::{Tool, ToolContext, ToolRegistry};
use crate::usage::{Usage, UsageStats};

const DEFAULT_MAX_TURNS: usize = 10;

/// Per-run configuration.
#[derive(Clone, Default)]
pub struct RunConfig {
    /// Overrides the agent's own turn limit
    pub max_turns: Option<usize>,

    /// Conversation history owned by the caller
    pub session: Option<Arc<dyn Session>>,

    pub model_provider: Option<Arc<dyn ModelProvider>>,
}

impl RunConfig {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            model_provider: Some(provider),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    fn provider(&self) -> Result<Arc<dyn ModelProvider>> {
        self.model_provider
            .clone()
            .ok_or_else(|| AgentsError::config("no model provider configured for this run"))
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("max_turns", &self.max_turns)
            .field("session", &self.session.as_ref().map(|s| s.session_id().to_string()))
            .field(
                "model_provider",
                &self.model_provider.as_ref().map(|p| p.model_name().to_string()),
            )
            .finish()
    }
}

type Events = Option<UnboundedSender<RunEvent>>;

fn emit(events: &Events, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

pub fn gen_trace_id() -> String {
    format!("trace_{}", uuid::Uuid::new_v4().simple())
}

/// The main entry point for executing agents.
pub struct Runner;

impl Runner {
    /// Runs `agent` on `input` to completion.
    ///
    /// Returns `RunOutcome::GuardrailTripped` when an input guardrail rejects
    /// the input; `Err` is reserved for failures (configuration, model errors,
    /// turn limit, session storage).
    pub async fn run(
        agent: Agent,
        input: impl Into<String>,
        config: RunConfig,
    ) -> Result<RunOutcome> {
        Self::execute(agent, input.into(), config, None, gen_trace_id()).await
    }

    /// Runs `agent` in a background task and returns its events.
    ///
    /// Configuration problems are reported here; everything after the run has
    /// started arrives as a terminal event on the stream.
    pub async fn run_stream(
        agent: Agent,
        input: impl Into<String>,
        config: RunConfig,
    ) -> Result<RunEventStream> {
        config.provider()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let trace_id = gen_trace_id();
        let input = input.into();
        let task_trace = trace_id.clone();

        tokio::spawn(async move {
            let events = Some(tx.clone());
            let terminal = match Self::execute(agent, input, config, events, task_trace).await {
                Ok(RunOutcome::Completed(result)) => RunEvent::Completed(result),
                Ok(RunOutcome::GuardrailTripped(trip)) => RunEvent::GuardrailTripped(trip),
                Err(e) => RunEvent::Failed {
                    error: e.to_string(),
                },
            };
            let _ = tx.send(terminal);
        });

        Ok(RunEventStream::new(rx, trace_id))
    }

    async fn execute(
        agent: Agent,
        input: String,
        config: RunConfig,
        events: Events,
        trace_id: String,
    ) -> Result<RunOutcome> {
        let span = info_span!("agent_run", agent = %agent.name(), trace_id = %trace_id);
        Self::execute_inner(agent, input, config, events, trace_id)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        agent: Agent,
        input: String,
        config: RunConfig,
        events: Events,
        trace_id: String,
    ) -> Result<RunOutcome> {
        let provider = config.provider()?;
        let ctx = ToolContext::new(provider.clone(), trace_id.clone());
        info!(agent = %agent.name(), "Starting agent run");
        emit(
            &events,
            RunEvent::AgentStarted {
                agent: agent.name().to_string(),
            },
        );

        // The gate resolves before any model call, tool listing or tool call.
        if agent.is_guarded() {
            let state =
                GuardrailRunner::check_input(&agent.config.input_guardrails, &ctx, &input).await?;
            if let GateState::Tripped {
                guardrail,
                reason,
                output_info,
            } = state
            {
                return Ok(RunOutcome::GuardrailTripped(GuardrailTrip {
                    agent: agent.name().to_string(),
                    guardrail,
                    reason,
                    output_info,
                    trace_id,
                }));
            }
        }

        let mut messages = vec![agent.build_system_message()];
        if let Some(session) = &config.session {
            let history = session.get_messages(None).await?;
            debug!(session = %session.session_id(), history = history.len(), "loaded session history");
            messages.extend(history);
        }
        messages.push(Message::user(input.clone()));

        let mut items = vec![RunItem::message(Role::User, input)];
        let result = Self::run_loop(agent, messages, &mut items, &config, &ctx, &events).await?;

        if let Some(session) = &config.session {
            session.add_items(result.items.clone()).await?;
        }
        Ok(RunOutcome::Completed(result))
    }

    /// Tools the active agent may call, plus one tool per handoff target.
    async fn build_registry(agent: &Agent) -> Result<ToolRegistry> {
        let mut tools: Vec<Arc<dyn Tool>> = agent.tools().to_vec();
        for server in agent.tool_servers() {
            match server.list_tools().await {
                Ok(remote) => tools.extend(remote),
                Err(e) => warn!(
                    agent = %agent.name(),
                    server = %server.name(),
                    error = %e,
                    "remote tools unavailable for this run"
                ),
            }
        }
        for handoff in agent.handoffs() {
            tools.push(Arc::new(HandoffTool::from(handoff.clone())));
        }
        ToolRegistry::new(tools)
    }

    async fn call_model(
        provider: &Arc<dyn ModelProvider>,
        request: ModelRequest,
        events: &Events,
    ) -> Result<(ModelResponse, Usage)> {
        let Some(tx) = events else {
            return provider.complete(request).await;
        };

        let agent = request.agent.clone();
        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<String>();
        let forward = async {
            while let Some(delta) = delta_rx.recv().await {
                let _ = tx.send(RunEvent::TextDelta {
                    agent: agent.clone(),
                    delta,
                });
            }
        };
        let (response, ()) = tokio::join!(provider.complete_streaming(request, delta_tx), forward);
        response
    }

    async fn run_loop(
        mut agent: Agent,
        mut messages: Vec<Message>,
        items: &mut Vec<RunItem>,
        config: &RunConfig,
        ctx: &ToolContext,
        events: &Events,
    ) -> Result<RunResult> {
        let mut usage_stats = UsageStats::new();
        let mut registry = Self::build_registry(&agent).await?;
        let max_turns = config
            .max_turns
            .or(agent.config.max_turns)
            .unwrap_or(DEFAULT_MAX_TURNS);
        let mut turn = 0;

        loop {
            turn += 1;
            if turn > max_turns {
                return Err(AgentsError::MaxTurnsExceeded { max_turns });
            }
            debug!(turn, agent = %agent.name(), tools = registry.len(), "Starting turn");

            let request = ModelRequest {
                agent: agent.name().to_string(),
                model: agent.config.model.clone(),
                messages: messages.clone(),
                tools: registry.specs(),
                temperature: agent.config.temperature,
                max_tokens: agent.config.max_tokens,
                output_schema: agent.config.output_schema.clone(),
            };
            let (response, usage) = Self::call_model(&ctx.provider, request, events).await?;
            usage_stats.record(agent.name(), usage);

            let content = response.content.clone().unwrap_or_default();

            if !response.has_tool_calls() {
                items.push(RunItem::message(Role::Assistant, content.clone()));
                info!(agent = %agent.name(), turns = turn, "Run completed");
                return Ok(RunResult {
                    final_output: content,
                    items: std::mem::take(items),
                    last_agent: agent.name().to_string(),
                    usage: usage_stats,
                    trace_id: ctx.trace_id.clone(),
                });
            }

            if !content.is_empty() {
                items.push(RunItem::message(Role::Assistant, content.clone()));
            }

            // A handoff ends this agent's participation; other calls in the
            // same response are dropped.
            if let Some((call, handoff)) = find_handoff(&agent, &response.tool_calls) {
                messages.push(Message::assistant_with_tool_calls(
                    content,
                    vec![call.clone()],
                ));
                Self::record_handoff(&agent, &call, &handoff, &mut messages, items, events);

                agent = handoff.agent().clone();
                messages[0] = agent.build_system_message();
                registry = Self::build_registry(&agent).await?;
                emit(
                    events,
                    RunEvent::AgentStarted {
                        agent: agent.name().to_string(),
                    },
                );
                continue;
            }

            messages.push(Message::assistant_with_tool_calls(
                content,
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                items.push(RunItem::ToolCall(ToolCallItem {
                    id: call.id.clone(),
                    agent: agent.name().to_string(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    created_at: chrono::Utc::now(),
                }));
                emit(
                    events,
                    RunEvent::ToolCallStarted {
                        agent: agent.name().to_string(),
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                );

                let result = registry
                    .invoke(ctx, &call.name, call.arguments.clone())
                    .await;
                let text = result.to_model_text();
                debug!(tool = %call.name, is_error = result.is_error(), "tool finished");

                emit(
                    events,
                    RunEvent::ToolCallFinished {
                        agent: agent.name().to_string(),
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        output: text.clone(),
                        is_error: result.is_error(),
                    },
                );
                items.push(RunItem::ToolOutput(ToolOutputItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    tool_call_id: call.id.clone(),
                    output: result.output,
                    error: result.error,
                    created_at: chrono::Utc::now(),
                }));
                messages.push(Message::tool(text, &call.id));
            }
        }
    }

    fn record_handoff(
        from: &Agent,
        call: &ToolCall,
        handoff: &Handoff,
        messages: &mut Vec<Message>,
        items: &mut Vec<RunItem>,
        events: &Events,
    ) {
        let to = handoff.agent().name().to_string();
        info!(from = %from.name(), to = %to, "🔄 Handoff");

        let reason = call
            .arguments
            .get("reason")
            .and_then(|r| r.as_str())
            .map(str::to_string);
        let ack = HandoffTool::from(handoff.clone()).acknowledgement();

        items.push(RunItem::ToolCall(ToolCallItem {
            id: call.id.clone(),
            agent: from.name().to_string(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            created_at: chrono::Utc::now(),
        }));
        items.push(RunItem::Handoff(HandoffItem {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from.name().to_string(),
            to_agent: to.clone(),
            reason,
            created_at: chrono::Utc::now(),
        }));
        items.push(RunItem::ToolOutput(ToolOutputItem {
            id: uuid::Uuid::new_v4().to_string(),
            tool_call_id: call.id.clone(),
            output: ack.clone(),
            error: None,
            created_at: chrono::Utc::now(),
        }));
        messages.push(Message::tool(ack.to_string(), &call.id));

        emit(
            events,
            RunEvent::Handoff {
                from_agent: from.name().to_string(),
                to_agent: to,
            },
        );
    }
}

fn find_handoff(agent: &Agent, calls: &[ToolCall]) -> Option<(ToolCall, Handoff)> {
    calls.iter().find_map(|call| {
        agent
            .handoffs()
            .iter()
            .find(|h| h.tool_name == call.name)
            .map(|h| (call.clone(), h.clone()))
    })
}

/// Runs `agent` and waits for the outcome on the current thread.
///
/// For front ends without an async runtime of their own.
pub fn run_blocking(agent: Agent, input: impl Into<String>, config: RunConfig) -> Result<RunOutcome> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(Runner::run(agent, input, config))
}
