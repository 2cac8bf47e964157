//! Embedding-backed record store on SQLite.

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{NutritionRecord, NutritionStore};
use crate::error::{AgentsError, Result};

const EMBED_BATCH: usize = 100;

/// Turns texts into vectors. One vector per input, same order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeddings from the OpenAI API.
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIEmbedder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()?;
        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(AgentsError::ModelBehaviorError {
                message: format!(
                    "asked for {} embeddings, received {}",
                    texts.len(),
                    data.len()
                ),
            });
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Records plus their document embeddings, grouped by collection name.
pub struct SqliteNutritionStore {
    pool: Pool<Sqlite>,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteNutritionStore {
    pub async fn open(
        db_path: impl AsRef<Path>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(pool, collection, embedder).await
    }

    pub async fn new_in_memory(
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::with_pool(pool, collection, embedder).await
    }

    async fn with_pool(
        pool: Pool<Sqlite>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nutrition_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                food_item TEXT NOT NULL,
                food_category TEXT NOT NULL,
                calories_per_100g INTEGER NOT NULL,
                kj_per_100g INTEGER,
                serving TEXT,
                document TEXT NOT NULL,
                embedding TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_nutrition_collection ON nutrition_records(collection)",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            collection: collection.into(),
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embeds and stores `records`; returns how many were added.
    pub async fn add_records(&self, records: &[NutritionRecord]) -> Result<usize> {
        for chunk in records.chunks(EMBED_BATCH) {
            let documents: Vec<String> = chunk.iter().map(NutritionRecord::document_text).collect();
            let embeddings = self.embedder.embed(&documents).await?;

            let mut tx = self.pool.begin().await?;
            for ((record, document), embedding) in chunk.iter().zip(&documents).zip(&embeddings) {
                sqlx::query(
                    r#"
                    INSERT INTO nutrition_records
                        (collection, food_item, food_category, calories_per_100g,
                         kj_per_100g, serving, document, embedding)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&self.collection)
                .bind(&record.food_item)
                .bind(&record.food_category)
                .bind(record.calories_per_100g as i64)
                .bind(record.kj_per_100g.map(|v| v as i64))
                .bind(&record.serving)
                .bind(document)
                .bind(serde_json::to_string(embedding)?)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            debug!(collection = %self.collection, added = chunk.len(), "stored nutrition records");
        }
        info!(collection = %self.collection, total = records.len(), "nutrition records indexed");
        Ok(records.len())
    }

    pub async fn count(&self) -> Result<usize> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM nutrition_records WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(n as usize)
    }

    /// Removes every record of this collection.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM nutrition_records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NutritionStore for SqliteNutritionStore {
    async fn query(&self, text: &str, n: usize) -> Result<Vec<NutritionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT food_item, food_category, calories_per_100g, kj_per_100g, serving, embedding
            FROM nutrition_records
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() || n == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AgentsError::ModelBehaviorError {
                message: "no embedding returned for query".to_string(),
            })?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: Vec<f32> = serde_json::from_str(row.get::<&str, _>("embedding"))?;
            let kj: Option<i64> = row.get("kj_per_100g");
            let record = NutritionRecord {
                food_item: row.get("food_item"),
                food_category: row.get("food_category"),
                calories_per_100g: row.get::<i64, _>("calories_per_100g") as u32,
                kj_per_100g: kj.map(|v| v as u32),
                serving: row.get("serving"),
            };
            scored.push((cosine_similarity(&query_vec, &embedding), record));
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(n).map(|(_, r)| r).collect())
    }
}
