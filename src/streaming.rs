//! Run events for incremental consumers (chat front ends).
//!
//! A [`RunEventStream`] is produced per run by
//! [`Runner::run_stream`](crate::runner::Runner::run_stream). It is finite:
//! it ends right after one terminal event (`Completed`, `GuardrailTripped` or
//! `Failed`). Events from agents running inside an agent tool never appear in it.

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::result::{GuardrailTrip, RunResult};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// An agent became active (the starting agent, or a handoff target)
    AgentStarted { agent: String },
    TextDelta { agent: String, delta: String },
    ToolCallStarted {
        agent: String,
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolCallFinished {
        agent: String,
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    Handoff { from_agent: String, to_agent: String },
    GuardrailTripped(GuardrailTrip),
    Completed(RunResult),
    Failed { error: String },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::GuardrailTripped(_) | RunEvent::Completed(_) | RunEvent::Failed { .. }
        )
    }
}

/// Stream of [`RunEvent`]s for a single run.
pub struct RunEventStream {
    inner: UnboundedReceiverStream<RunEvent>,
    trace_id: String,
    finished: bool,
}

impl RunEventStream {
    pub(crate) fn new(rx: UnboundedReceiver<RunEvent>, trace_id: String) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
            trace_id,
            finished: false,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

impl Stream for RunEventStream {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            other => other,
        }
    }
}
