//! Builds the nutrition knowledge base from a calories CSV.
//!
//! ```text
//! build_calorie_db <calories.csv> [calorie_database.txt]
//! ```
//!
//! Replaces the collection in `NUTRITION_DB_PATH` with freshly embedded
//! records and, when a second path is given, also writes the plain-text
//! database there.

use std::path::PathBuf;
use std::sync::Arc;

use nutrition_agents::knowledge::{
    parse_calories_csv, render_text_database, OpenAIEmbedder, SqliteNutritionStore,
};
use nutrition_agents::{AgentsError, AppConfig};

#[tokio::main]
async fn main() -> nutrition_agents::Result<()> {
    dotenvy::dotenv().ok();
    nutrition_agents::init_tracing();

    let mut args = std::env::args().skip(1);
    let csv_path = args.next().map(PathBuf::from).ok_or_else(|| AgentsError::UserError {
        message: "usage: build_calorie_db <calories.csv> [text_out]".to_string(),
    })?;
    let text_out = args.next().map(PathBuf::from);

    let records = parse_calories_csv(&std::fs::read_to_string(&csv_path)?)?;
    println!("Read {} food items from {}", records.len(), csv_path.display());

    if let Some(out) = &text_out {
        std::fs::write(out, render_text_database(&records))?;
        println!("Wrote text database to {}", out.display());
    }

    let config = AppConfig::from_env()?;
    let embedder = Arc::new(OpenAIEmbedder::new(
        config.openai_client(),
        &config.store.embedding_model,
    ));
    let store = SqliteNutritionStore::open(
        &config.store.nutrition_db_path,
        &config.store.collection,
        embedder,
    )
    .await?;
    store.clear().await?;
    let added = store.add_records(&records).await?;

    println!(
        "Indexed {} records into collection '{}' at {}",
        added,
        store.collection(),
        config.store.nutrition_db_path.display()
    );
    Ok(())
}
