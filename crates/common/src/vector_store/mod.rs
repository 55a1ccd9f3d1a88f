//! Entity embedding store adapters
//!
//! Nearest-neighbour lookup and upsert over entity description embeddings.
//! The adapters own no ranking logic beyond similarity ordering.

mod memory;
mod pgvector;

pub use memory::InMemoryVectorStore;
pub use pgvector::PgVectorStore;

use crate::config::{VectorStoreConfig, VectorStoreProvider};
use crate::errors::Result;
use crate::llm::Embedder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One stored embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// A record returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    /// Cosine similarity, higher is closer
    pub score: f32,
}

/// Trait for embedding store backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Up to `k` records closest to `query`, most similar first
    async fn similarity_search_by_vector(&self, query: &[f32], k: usize)
        -> Result<Vec<ScoredRecord>>;

    /// Embed `text` and search by the resulting vector
    async fn similarity_search_by_text(
        &self,
        text: &str,
        embedder: &dyn Embedder,
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let query = embedder.embed(text).await?;
        self.similarity_search_by_vector(&query, k).await
    }

    /// Backend name, used as a metrics label
    fn name(&self) -> &str;
}

/// Connect the configured backend
pub async fn connect(config: &VectorStoreConfig, dimension: usize) -> Result<Arc<dyn VectorStore>> {
    match config.provider {
        VectorStoreProvider::Memory => Ok(Arc::new(InMemoryVectorStore::with_dimension(dimension))),
        VectorStoreProvider::Pgvector => Ok(Arc::new(PgVectorStore::connect(config, dimension).await?)),
    }
}

/// Cosine similarity; 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let store = connect(&VectorStoreConfig::default(), 3).await.unwrap();
        assert_eq!(store.name(), "memory");
        assert!(store
            .similarity_search_by_vector(&[1.0, 0.0, 0.0], 5)
            .await
            .unwrap()
            .is_empty());
    }
}
