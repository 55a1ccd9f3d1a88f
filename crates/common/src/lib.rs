//! GraphSearch Common Library
//!
//! Shared code for the GraphSearch query pipeline including:
//! - Knowledge base read model and table loading
//! - Language model client abstraction (chat + embeddings)
//! - Entity embedding store adapters
//! - Error types and handling
//! - Configuration management
//! - Tokenization and metrics

pub mod config;
pub mod errors;
pub mod knowledge;
pub mod llm;
pub mod metrics;
pub mod tokenizer;
pub mod vector_store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use knowledge::KnowledgeBase;
pub use llm::{ChatModel, Embedder};
pub use tokenizer::Tokenizer;
pub use vector_store::VectorStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
