//! # SQLite-backed conversation history
//!
//! [`SqliteSession`] keeps the items of completed runs in a single SQLite file
//! (`conversation_history.db` by default) so the chat front end can resume a
//! conversation after a restart. Several sessions can share one file; rows
//! are keyed by session id and ordered by a per-session sequence number.
//!
//! ```rust,no_run
//! use nutrition_agents::items::{Role, RunItem};
//! use nutrition_agents::memory::Session;
//! use nutrition_agents::sqlite_session::SqliteSession;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SqliteSession::new("nutrition_chat", "conversation_history.db").await?;
//! session
//!     .add_items(vec![RunItem::message(Role::User, "How many calories in an avocado?")])
//!     .await?;
//!
//! let messages = session.get_messages(None).await?;
//! assert_eq!(messages.last().map(|m| m.content.as_str()), Some("How many calories in an avocado?"));
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::items::RunItem;
use crate::memory::Session;

pub const DEFAULT_SESSION_DB: &str = "conversation_history.db";

/// How long a writer waits for another session's append on the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`Session`] stored in SQLite.
pub struct SqliteSession {
    session_id: String,
    pool: Pool<Sqlite>,
}

impl SqliteSession {
    /// Opens (creating if needed) the database at `db_path`.
    pub async fn new(session_id: impl Into<String>, db_path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(session_id, pool).await
    }

    pub async fn new_default(session_id: impl Into<String>) -> Result<Self> {
        Self::new(session_id, DEFAULT_SESSION_DB).await
    }

    /// Creates an in-memory session, useful for testing.
    pub async fn new_in_memory(session_id: impl Into<String>) -> Result<Self> {
        // Every connection to ":memory:" is its own database.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(session_id, pool).await
    }

    async fn with_pool(session_id: impl Into<String>, pool: Pool<Sqlite>) -> Result<Self> {
        Self::run_migrations(&pool).await?;
        let session_id = session_id.into();
        debug!(session = %session_id, "session store ready");
        Ok(Self { session_id, pool })
    }

    async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                item_type TEXT NOT NULL,
                item_data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                sequence_num INTEGER NOT NULL,
                UNIQUE(session_id, sequence_num)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_session_id
            ON sessions(session_id, sequence_num)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Session for SqliteSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<RunItem>> {
        let query = match limit {
            Some(limit) => sqlx::query(
                r#"
                SELECT item_data FROM sessions
                WHERE session_id = ?
                ORDER BY sequence_num DESC
                LIMIT ?
                "#,
            )
            .bind(&self.session_id)
            .bind(limit as i64),
            None => sqlx::query(
                r#"
                SELECT item_data FROM sessions
                WHERE session_id = ?
                ORDER BY sequence_num ASC
                "#,
            )
            .bind(&self.session_id),
        };

        let rows = query.fetch_all(&self.pool).await?;
        let mut items = rows
            .iter()
            .map(|row| {
                let data: String = row.get("item_data");
                Ok(serde_json::from_str(&data)?)
            })
            .collect::<Result<Vec<RunItem>>>()?;

        if limit.is_some() {
            items.reverse();
        }
        Ok(items)
    }

    async fn add_items(&self, items: Vec<RunItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        // One transaction per run keeps a conversation turn all-or-nothing.
        // Every statement is a write that numbers itself, so the transaction
        // never holds a read snapshot it would later have to upgrade.
        let mut tx = self.pool.begin().await?;
        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_id, item_type, item_data, created_at, sequence_num)
                SELECT ?1, ?2, ?3, ?4, COALESCE(MAX(sequence_num), 0) + 1
                FROM sessions WHERE session_id = ?1
                "#,
            )
            .bind(&self.session_id)
            .bind(item.kind())
            .bind(serde_json::to_string(item)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(session = %self.session_id, added = items.len(), "session items stored");
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(&self.session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSession")
            .field("session_id", &self.session_id)
            .finish()
    }
}
