//! # Nutrition knowledge base
//!
//! Food records come from a calories CSV, are rendered to one text document
//! each, embedded, and stored in SQLite ([`SqliteNutritionStore`]). Agents
//! reach them through [`CalorieLookupTool`], which answers with one line per
//! match:
//!
//! ```text
//! Nutrition Information:
//! Chicken Breast (Poultry): 165 calories per 100g
//! ```

mod store;

pub use store::{cosine_similarity, Embedder, OpenAIEmbedder, SqliteNutritionStore};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AgentsError, Result};
use crate::tool::{schema_value, Tool, ToolContext, ToolResult};

pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";
pub const DEFAULT_MAX_RESULTS: usize = 3;
const MAX_RESULTS_CAP: usize = 20;

const CSV_HEADER: [&str; 5] = [
    "FoodCategory",
    "FoodItem",
    "per100grams",
    "Cals_per100grams",
    "KJ_per100grams",
];

/// One food item with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    pub food_item: String,
    pub food_category: String,
    pub calories_per_100g: u32,
    pub kj_per_100g: Option<u32>,
    /// Reference portion from the source data, e.g. `100g` or `100ml`
    pub serving: Option<String>,
}

impl NutritionRecord {
    pub fn new(
        food_item: impl Into<String>,
        food_category: impl Into<String>,
        calories_per_100g: u32,
    ) -> Self {
        Self {
            food_item: food_item.into(),
            food_category: food_category.into(),
            calories_per_100g,
            kj_per_100g: None,
            serving: None,
        }
    }

    /// Text that gets embedded for similarity search.
    pub fn document_text(&self) -> String {
        let kj = self
            .kj_per_100g
            .map(|kj| kj.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "Food: {item}\n\
             Category: {category}\n\
             Nutritional Information:\n\
             - Calories: {cal} per 100g\n\
             - Energy: {kj} kJ per 100g\n\
             - Serving size reference: {serving}\n\
             \n\
             This is a {category_lower} food item that provides {cal} calories per 100 grams.",
            item = self.food_item,
            category = self.food_category,
            cal = self.calories_per_100g,
            kj = kj,
            serving = self.serving.as_deref().unwrap_or("100g"),
            category_lower = self.food_category.to_lowercase(),
        )
    }

    /// `"<Food Item> (<Category>): <cal> calories per 100g"`
    pub fn lookup_line(&self) -> String {
        format!(
            "{} ({}): {} calories per 100g",
            title_case(&self.food_item),
            title_case(&self.food_category),
            self.calories_per_100g
        )
    }
}

/// Capitalizes the first letter of every run of letters and lowercases the
/// rest: `"chicken breast"` → `"Chicken Breast"`, `"CannedFruit"` → `"Cannedfruit"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Formats store matches for the model. Never returns an empty string.
pub fn format_lookup(query: &str, records: &[NutritionRecord]) -> String {
    if records.is_empty() {
        return format!("No nutrition information found for: {}", query);
    }
    let lines: Vec<String> = records.iter().map(NutritionRecord::lookup_line).collect();
    format!("Nutrition Information:\n{}", lines.join("\n"))
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    fields.push(field);
    fields
}

/// Whole, non-negative amounts only; anything that does not fit a `u32` is
/// rejected rather than saturated.
fn parse_amount(raw: &str, suffix: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix(suffix).unwrap_or(trimmed).trim();
    if let Ok(v) = number.parse::<u32>() {
        return Some(v);
    }
    let v = number.parse::<f64>().ok()?.round();
    if v.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&v) {
        Some(v as u32)
    } else {
        None
    }
}

/// Parses the calories CSV.
///
/// Expects the header `FoodCategory,FoodItem,per100grams,Cals_per100grams,KJ_per100grams`.
/// Calorie and energy cells may carry ` cal` / ` kJ` suffixes.
pub fn parse_calories_csv(text: &str) -> Result<Vec<NutritionRecord>> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| AgentsError::UserError {
        message: "calories CSV is empty".to_string(),
    })?;
    let columns: Vec<String> = split_csv_line(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|c| c.trim().to_string())
        .collect();
    if columns != CSV_HEADER {
        return Err(AgentsError::UserError {
            message: format!(
                "unexpected CSV header {:?}, expected {}",
                columns,
                CSV_HEADER.join(",")
            ),
        });
    }

    let mut records = Vec::new();
    for (index, line) in lines {
        let line_no = index + 1;
        let fields = split_csv_line(line);
        if fields.len() != CSV_HEADER.len() {
            return Err(AgentsError::UserError {
                message: format!(
                    "line {}: expected {} fields, found {}",
                    line_no,
                    CSV_HEADER.len(),
                    fields.len()
                ),
            });
        }
        let calories =
            parse_amount(&fields[3], "cal").ok_or_else(|| AgentsError::UserError {
                message: format!("line {}: invalid calories '{}'", line_no, fields[3].trim()),
            })?;

        let energy = fields[4].trim();
        let kj_per_100g = if energy.is_empty() {
            None
        } else {
            Some(
                parse_amount(energy, "kJ").ok_or_else(|| AgentsError::UserError {
                    message: format!("line {}: invalid energy '{}'", line_no, energy),
                })?,
            )
        };

        records.push(NutritionRecord {
            food_category: fields[0].trim().to_string(),
            food_item: fields[1].trim().to_string(),
            serving: Some(fields[2].trim().to_string()).filter(|s| !s.is_empty()),
            calories_per_100g: calories,
            kj_per_100g,
        });
    }
    Ok(records)
}

/// The plain-text database: every document, separated by `---` lines.
pub fn render_text_database(records: &[NutritionRecord]) -> String {
    records
        .iter()
        .map(NutritionRecord::document_text)
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

/// Similarity search over nutrition records.
#[async_trait]
pub trait NutritionStore: Send + Sync {
    /// At most `n` records, most similar first.
    async fn query(&self, text: &str, n: usize) -> Result<Vec<NutritionRecord>>;
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LookupArgs {
    /// The food item to look up.
    pub query: String,
    /// The maximum number of results to return.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

/// `calorie_lookup_tool`: read-only query against a [`NutritionStore`].
pub struct CalorieLookupTool {
    store: Arc<dyn NutritionStore>,
}

impl CalorieLookupTool {
    pub const NAME: &'static str = "calorie_lookup_tool";

    pub fn new(store: Arc<dyn NutritionStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, args: LookupArgs) -> Result<String> {
        if args.max_results == 0 {
            return Err(AgentsError::ToolExecutionError {
                message: format!("{}: max_results must be at least 1", Self::NAME),
            });
        }
        let n = args.max_results.min(MAX_RESULTS_CAP);
        let records = self.store.query(&args.query, n).await?;
        debug!(query = %args.query, matches = records.len(), "calorie lookup");
        Ok(format_lookup(&args.query, &records))
    }
}

impl std::fmt::Debug for CalorieLookupTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalorieLookupTool").finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for CalorieLookupTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Look up calorie information for specific food items (not whole meals) in the nutrition database."
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<LookupArgs>()
    }

    async fn execute(&self, _ctx: &ToolContext, arguments: Value) -> Result<ToolResult> {
        let args: LookupArgs =
            serde_json::from_value(arguments).map_err(|e| AgentsError::ToolExecutionError {
                message: format!("invalid arguments for {}: {}", Self::NAME, e),
            })?;
        Ok(ToolResult::text(self.lookup(args).await?))
    }
}
