//! Runtime configuration
//!
//! Credentials and tunables are read from the process environment exactly once
//! (binaries call `dotenvy::dotenv()` first) into an immutable [`AppConfig`].
//! Everything downstream receives the pieces it needs through constructors.

use async_openai::{config::OpenAIConfig, Client};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AgentsError, Result};
use crate::model::OpenAIProvider;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_SEARCH_URL: &str = "https://mcp.exa.ai/mcp";

/// Connection settings for the remote search server.
#[derive(Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Endpoint without credentials, e.g. `https://mcp.exa.ai/mcp`
    pub base_url: String,

    /// Capability credential appended as the `exaApiKey` query parameter.
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Retries after a transport failure
    pub max_retries: usize,

    /// Keep the first successful `tools/list` answer for the lifetime of the client
    pub cache_tools_list: bool,
}

impl SearchConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            max_retries: 1,
            cache_tools_list: true,
        }
    }

    /// Reads `EXA_API_KEY` (required) and `EXA_MCP_URL` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
            .ok_or_else(|| AgentsError::config("EXA_API_KEY is not set"))
    }

    /// `None` when no credential is available.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let key = get("EXA_API_KEY")?;
        let base = get("EXA_MCP_URL").unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
        Some(Self::new(base, key))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Full endpoint including the credential.
    pub fn endpoint(&self) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}exaApiKey={}", self.base_url, sep, self.api_key)
    }

    /// Endpoint safe to print or log.
    pub fn redacted_endpoint(&self) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}exaApiKey=***", self.base_url, sep)
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("endpoint", &self.redacted_endpoint())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("cache_tools_list", &self.cache_tools_list)
            .finish()
    }
}

/// Where the nutrition knowledge base and conversation history live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub nutrition_db_path: PathBuf,
    pub collection: String,
    pub embedding_model: String,
    pub session_db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            nutrition_db_path: PathBuf::from("nutrition.db"),
            collection: "nutrition_db".to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            session_db_path: PathBuf::from("conversation_history.db"),
        }
    }
}

/// Process-wide configuration, built once at start-up.
#[derive(Clone)]
pub struct AppConfig {
    openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub model: String,
    pub search: Option<SearchConfig>,
    pub store: StoreConfig,
    pub prompts_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// `OPENAI_API_KEY` is required. `EXA_API_KEY` is optional here; callers that
    /// need search use [`AppConfig::require_search`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same parsing as [`AppConfig::from_env`] against an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| AgentsError::config("OPENAI_API_KEY is not set"))?;

        let search = SearchConfig::from_lookup(&lookup);

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            nutrition_db_path: get("NUTRITION_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.nutrition_db_path),
            collection: defaults.collection,
            embedding_model: get("NUTRITION_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            session_db_path: get("NUTRITION_SESSION_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_db_path),
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL"),
            model: get("NUTRITION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            search,
            store,
            prompts_path: get("NUTRITION_PROMPTS_PATH").map(PathBuf::from),
        })
    }

    pub fn require_search(&self) -> Result<&SearchConfig> {
        self.search
            .as_ref()
            .ok_or_else(|| AgentsError::config("EXA_API_KEY is not set"))
    }

    /// OpenAI client configured with the loaded credential.
    pub fn openai_client(&self) -> Client<OpenAIConfig> {
        let mut cfg = OpenAIConfig::new().with_api_key(&self.openai_api_key);
        if let Some(base) = &self.openai_base_url {
            cfg = cfg.with_api_base(base);
        }
        Client::with_config(cfg)
    }

    pub fn provider(&self) -> Arc<OpenAIProvider> {
        Arc::new(OpenAIProvider::with_client(
            self.openai_client(),
            self.model.clone(),
        ))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openai_api_key", &"***")
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("search", &self.search)
            .field("store", &self.store)
            .field("prompts_path", &self.prompts_path)
            .finish()
    }
}
