//! Language model client abstraction
//!
//! Provides a unified interface over the two model capabilities the
//! query pipeline needs:
//! - Chat completion ([`ChatModel`])
//! - Text embedding ([`Embedder`])
//!
//! Both go through the same bounded retry layer ([`retry`]).

pub mod mock;
mod openai;
pub mod retry;

pub use openai::OpenAIClient;
pub use retry::RetryPolicy;

pub use crate::config::GenerationParams;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Speaker of a chat message or conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Trait for chat completion
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a conversation, returning the assistant's text
    async fn complete(&self, messages: &[ChatMessage], params: &GenerationParams)
        -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}
