//! Conversation items: messages, tool calls, model responses and run items
//!
//! `RunItem` is what a run records and what a [`Session`](crate::memory::Session)
//! persists; `Message` is what goes to the model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// Response from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ModelResponse {
    pub fn new_message(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: Some("stop".to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn new_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: None,
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// A single recorded step of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunItem {
    Message(MessageItem),
    ToolCall(ToolCallItem),
    ToolOutput(ToolOutputItem),
    Handoff(HandoffItem),
}

impl RunItem {
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        RunItem::Message(MessageItem {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        })
    }

    /// Short tag stored next to the serialized item.
    pub fn kind(&self) -> &'static str {
        match self {
            RunItem::Message(_) => "message",
            RunItem::ToolCall(_) => "tool_call",
            RunItem::ToolOutput(_) => "tool_output",
            RunItem::Handoff(_) => "handoff",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallItem {
    pub id: String,
    pub agent: String,
    pub tool_name: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputItem {
    pub id: String,
    pub tool_call_id: String,
    pub output: Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffItem {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Helper functions for working with items
pub struct ItemHelpers;

impl ItemHelpers {
    /// Rebuild conversation history from stored items.
    ///
    /// Only user and assistant text is replayed. Tool calls and their outputs
    /// belong to the run that produced them; replaying a tool output without the
    /// assistant message that requested it would be rejected by the API.
    pub fn to_messages(items: &[RunItem]) -> Vec<Message> {
        items
            .iter()
            .filter_map(|item| match item {
                RunItem::Message(msg) if !msg.content.is_empty() => match msg.role {
                    Role::User => Some(Message::user(&msg.content)),
                    Role::Assistant => Some(Message::assistant(&msg.content)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(items: &[RunItem]) -> Vec<&ToolCallItem> {
        items
            .iter()
            .filter_map(|item| match item {
                RunItem::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn handoffs(items: &[RunItem]) -> Vec<&HandoffItem> {
        items
            .iter()
            .filter_map(|item| match item {
                RunItem::Handoff(h) => Some(h),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_creation() {
        let sys_msg = Message::system("You are a helpful nutrition assistant");
        assert_eq!(sys_msg.role, Role::System);
        assert!(sys_msg.tool_call_id.is_none());

        let tool_msg = Message::tool("Nutrition Information:", "call_123");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id, Some("call_123".to_string()));

        let call = ToolCall::new("calorie_lookup_tool", serde_json::json!({"query": "apple"}));
        let with_calls = Message::assistant_with_tool_calls("", vec![call.clone()]);
        assert_eq!(with_calls.tool_calls, Some(vec![call]));
    }

    #[test]
    fn test_model_response() {
        let response = ModelResponse::new_message("An apple has 52 calories per 100g.");
        assert!(response.has_content());
        assert!(!response.has_tool_calls());

        let empty = ModelResponse {
            content: Some(String::new()),
            ..ModelResponse::new_message("")
        };
        assert!(!empty.has_content());

        let tool_response = ModelResponse::new_tool_calls(vec![ToolCall::new(
            "calorie_lookup_tool",
            serde_json::json!({"query": "banana"}),
        )]);
        assert!(!tool_response.has_content());
        assert!(tool_response.has_tool_calls());
    }

    #[test]
    fn test_run_item_tagging() {
        let handoff = RunItem::Handoff(HandoffItem {
            id: "handoff_1".to_string(),
            from_agent: "Breakfast Advisor".to_string(),
            to_agent: "Breakfast Price Checker Assistant".to_string(),
            reason: None,
            created_at: Utc::now(),
        });
        let serialized = serde_json::to_string(&handoff).unwrap();
        assert!(serialized.contains("\"type\":\"Handoff\""));
        assert_eq!(handoff.kind(), "handoff");

        let back: RunItem = serde_json::from_str(&serialized).unwrap();
        assert!(matches!(back, RunItem::Handoff(h) if h.from_agent == "Breakfast Advisor"));
    }

    #[test]
    fn test_to_messages_replays_only_conversation_text() {
        let items = vec![
            RunItem::message(Role::User, "Calories in oatmeal?"),
            RunItem::ToolCall(ToolCallItem {
                id: "call_1".to_string(),
                agent: "Nutrition Assistant".to_string(),
                tool_name: "calorie_lookup_tool".to_string(),
                arguments: serde_json::json!({"query": "oatmeal"}),
                created_at: Utc::now(),
            }),
            RunItem::ToolOutput(ToolOutputItem {
                id: "out_1".to_string(),
                tool_call_id: "call_1".to_string(),
                output: serde_json::json!("Oatmeal (Cereal): 68 calories per 100g"),
                error: None,
                created_at: Utc::now(),
            }),
            RunItem::message(Role::Assistant, ""),
            RunItem::message(Role::Assistant, "Oatmeal has 68 kcal per 100g."),
        ];

        let messages = ItemHelpers::to_messages(&items);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], Message::user("Calories in oatmeal?"));
        assert_eq!(messages[1], Message::assistant("Oatmeal has 68 kcal per 100g."));

        assert_eq!(ItemHelpers::tool_calls(&items).len(), 1);
        assert!(ItemHelpers::handoffs(&items).is_empty());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(role, Role::Tool);
    }
}
