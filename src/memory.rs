//! Conversation memory shared across runs.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::Result;
use crate::items::{ItemHelpers, Message, RunItem};

/// Append-only store of the items produced by completed runs.
///
/// The runner reads the history before the first model call and appends the
/// run's items once it completes; tripped or failed runs leave it untouched.
#[async_trait]
pub trait Session: Send + Sync + Debug {
    fn session_id(&self) -> &str;

    /// Items in insertion order. With a limit, the most recent `limit` items.
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>>;

    async fn add_items(&self, items: Vec<RunItem>) -> Result<()>;

    /// Forgets the whole conversation (the chat front end's `/reset`).
    async fn clear_session(&self) -> Result<()>;

    /// History as model messages: user and assistant text only.
    async fn get_messages(&self, limit: Option<usize>) -> Result<Vec<Message>> {
        let items = self.get_items(limit).await?;
        Ok(ItemHelpers::to_messages(&items))
    }
}

/// Non-persistent session, handy for a single chat process or tests.
#[derive(Debug, Default)]
pub struct InMemorySession {
    session_id: String,
    items: tokio::sync::RwLock<Vec<RunItem>>,
}

impl InMemorySession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Default::default(),
        }
    }
}

#[async_trait]
impl Session for InMemorySession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>> {
        let items = self.items.read().await;
        let start = limit.map_or(0, |n| items.len().saturating_sub(n));
        Ok(items[start..].to_vec())
    }

    async fn add_items(&self, items: Vec<RunItem>) -> Result<()> {
        self.items.write().await.extend(items);
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.items.write().await.clear();
        Ok(())
    }
}
