//! Configuration management for GraphSearch
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with GRAPHSEARCH__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Nothing in this module reads secrets from the process environment on its own;
//! the binary decides how the API key reaches [`LlmConfig`].

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat completion endpoint configuration
    pub llm: LlmConfig,

    /// Embedding endpoint configuration
    pub embedding: EmbeddingConfig,

    /// Entity embedding store configuration
    pub vector_store: VectorStoreConfig,

    /// Knowledge base tables
    pub knowledge_base: KnowledgeBaseConfig,

    /// Context builder parameters
    pub local_context: LocalContextParams,

    /// Answer generation parameters
    pub generation: GenerationParams,

    /// Follow-up question generation
    pub questions: QuestionConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key for the chat and embedding endpoints
    pub api_key: Option<String>,

    /// API base URL (OpenAI compatible)
    pub api_base: String,

    /// Chat model to use
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first one
    pub max_attempts: u32,

    /// First backoff interval in milliseconds
    pub initial_interval_ms: u64,

    /// Upper bound for a single backoff interval in milliseconds
    pub max_interval_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,

    /// Overall ceiling for one call including all retries, in seconds
    pub max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model to use
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Batch size for embedding requests
    pub batch_size: usize,
}

/// Vector store backend
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreProvider {
    /// Process-local store, rebuilt on every run
    Memory,
    /// Postgres with the pgvector extension
    Pgvector,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Backend to use
    pub provider: VectorStoreProvider,

    /// Connection URI (pgvector only)
    pub uri: Option<String>,

    /// Collection (table) name
    pub collection: String,

    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Per-statement timeout in seconds
    pub query_timeout_secs: u64,

    /// Maximum pooled connections
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Directory holding the indexer output tables
    pub artifacts_dir: String,

    /// Entity table name
    pub entity_table: String,

    /// Entity description embedding table name
    pub entity_embedding_table: String,

    /// Relationship table name
    pub relationship_table: String,

    /// Community report table name
    pub community_report_table: String,

    /// Text unit table name
    pub text_unit_table: String,

    /// Highest community hierarchy level kept
    pub max_community_level: u32,
}

/// Which entity attribute keys records in the embedding store
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    Id,
    Title,
}

/// Attribute relationships are ordered by
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipRanking {
    /// Relationship rank (endpoint rank sum when absent)
    Rank,
    /// Relationship weight
    Weight,
}

/// Parameters for one context build
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct LocalContextParams {
    /// Overall token budget of the assembled context
    #[validate(range(min = 1))]
    pub max_tokens: usize,

    /// Share of the budget reserved for text units
    pub text_unit_prop: f64,

    /// Share of the budget reserved for community reports
    pub community_prop: f64,

    /// Question/answer turns of history considered
    pub conversation_history_max_turns: usize,

    /// Render only user turns of the history
    pub conversation_history_user_turns_only: bool,

    /// Entities mapped from the query
    #[validate(range(min = 1))]
    pub top_k_mapped_entities: usize,

    /// Out-of-network relationships kept per mapped entity
    pub top_k_relationships: usize,

    /// Nearest-neighbour oversampling factor
    #[validate(range(min = 1))]
    pub oversample_scaler: usize,

    pub include_entity_rank: bool,

    /// Column header for the entity rank
    pub rank_description: String,

    pub include_relationship_weight: bool,

    pub relationship_ranking: RelationshipRanking,

    pub include_community_rank: bool,

    /// Reports below this rank are skipped
    pub min_community_rank: f64,

    /// Render report summaries instead of full content
    pub use_community_summary: bool,

    /// Keep truncated candidates in the context records
    pub return_candidate_context: bool,

    pub embedding_vectorstore_key: EntityKey,

    /// Entity titles always included
    pub include_entity_names: Vec<String>,

    /// Entity titles never included
    pub exclude_entity_names: Vec<String>,

    #[validate(length(min = 1))]
    pub column_delimiter: String,
}

/// Budget split between evidence categories, as fractions of the remaining budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetShares {
    pub community: f64,
    pub local: f64,
    pub text_unit: f64,
}

impl BudgetShares {
    /// Split `tokens` into (community, local, text unit) allowances
    pub fn allocate(&self, tokens: usize) -> (usize, usize, usize) {
        let part = |share: f64| (tokens as f64 * share).floor().max(0.0) as usize;
        let community = part(self.community);
        let text_unit = part(self.text_unit);
        let local = part(self.local).min(tokens.saturating_sub(community + text_unit));
        (community, local, text_unit)
    }
}

impl LocalContextParams {
    /// Normalised budget shares.
    ///
    /// Each proportion is clamped into `[0, 1]` (NaN counts as 0). When the
    /// community and text unit shares together exceed 1 they are scaled down
    /// proportionally to sum to exactly 1 and the local share becomes 0.
    pub fn budget_shares(&self) -> BudgetShares {
        let clamp = |p: f64| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        let mut community = clamp(self.community_prop);
        let mut text_unit = clamp(self.text_unit_prop);

        let total = community + text_unit;
        if total > 1.0 {
            community /= total;
            text_unit /= total;
        }

        BudgetShares {
            community,
            text_unit,
            local: (1.0 - community - text_unit).max(0.0),
        }
    }
}

impl Default for LocalContextParams {
    fn default() -> Self {
        Self {
            max_tokens: 12_000,
            text_unit_prop: 0.5,
            community_prop: 0.1,
            conversation_history_max_turns: 5,
            conversation_history_user_turns_only: true,
            top_k_mapped_entities: 10,
            top_k_relationships: 10,
            oversample_scaler: 2,
            include_entity_rank: true,
            rank_description: "number of relationships".to_string(),
            include_relationship_weight: true,
            relationship_ranking: RelationshipRanking::Rank,
            include_community_rank: false,
            min_community_rank: 0.0,
            use_community_summary: false,
            return_candidate_context: false,
            embedding_vectorstore_key: EntityKey::Id,
            include_entity_names: Vec::new(),
            exclude_entity_names: Vec::new(),
            column_delimiter: "|".to_string(),
        }
    }
}

/// Chat completion parameters
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct GenerationParams {
    /// Maximum output tokens
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    /// Sampling temperature
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Requested answer shape, e.g. "multiple paragraphs"
    pub response_type: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.0,
            response_type: "multiple paragraphs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuestionConfig {
    /// Number of follow-up questions requested
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Service name attached to log lines
    pub service_name: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: crate::DEFAULT_CHAT_MODEL.to_string(),
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_interval_ms: 500,
            max_interval_ms: 30_000,
            multiplier: 2.0,
            max_elapsed_secs: 600,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: crate::DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 16,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreProvider::Memory,
            uri: None,
            collection: "entity_description_embeddings".to_string(),
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
            max_connections: 10,
        }
    }
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: "output/artifacts".to_string(),
            entity_table: "create_final_nodes".to_string(),
            entity_embedding_table: "create_final_entities".to_string(),
            relationship_table: "create_final_relationships".to_string(),
            community_report_table: "create_final_community_reports".to_string(),
            text_unit_table: "create_final_text_units".to_string(),
            max_community_level: 2,
        }
    }
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self { count: 5 }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "graphsearch".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., GRAPHSEARCH__LOCAL_CONTEXT__MAX_TOKENS=8000
            .add_source(
                Environment::with_prefix("GRAPHSEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("GRAPHSEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl LlmConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VectorStoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}
