//! Token usage for a single model call and aggregated over a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Add;

/// Token usage for a single model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    pub request_count: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_usage(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.add_usage(&other);
        self
    }
}

/// Usage across one run, broken down by agent.
///
/// Nested agent-as-tool runs keep their own stats; only the calls made by
/// agents that were active in this run are counted here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total: Usage,
    pub by_agent: HashMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, agent: &str, usage: Usage) {
        self.total.add_usage(&usage);
        self.by_agent
            .entry(agent.to_string())
            .and_modify(|u| u.add_usage(&usage))
            .or_insert(usage);
    }

    pub fn summary(&self) -> String {
        let mut agents: Vec<_> = self.by_agent.iter().collect();
        agents.sort_by(|a, b| a.0.cmp(b.0));

        let mut report = format!(
            "{} tokens in {} requests",
            self.total.total_tokens, self.total.request_count
        );
        for (agent, usage) in agents {
            report.push_str(&format!(
                "\n  {}: {} tokens, {} requests",
                agent, usage.total_tokens, usage.request_count
            ));
        }
        report
    }
}
