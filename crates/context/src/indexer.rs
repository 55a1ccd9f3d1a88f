//! Entity description indexer
//!
//! Writes one embedding store record per entity so the context builder can
//! map queries onto entities. Entities loaded without a description
//! embedding are embedded here, in batches.

use futures::stream::{self, StreamExt, TryStreamExt};
use graphsearch_common::config::EntityKey;
use graphsearch_common::knowledge::Entity;
use graphsearch_common::vector_store::VectorRecord;
use graphsearch_common::{AppError, Embedder, Result, VectorStore};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Embedding batches in flight at once
const EMBED_CONCURRENCY: usize = 4;

pub struct EntityIndexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    key: EntityKey,
    batch_size: usize,
}

impl EntityIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        key: EntityKey,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            key,
            batch_size: batch_size.max(1),
        }
    }

    fn key_of<'e>(&self, entity: &'e Entity) -> &'e str {
        match self.key {
            EntityKey::Id => &entity.id,
            EntityKey::Title => &entity.name,
        }
    }

    fn record(&self, entity: &Entity, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: self.key_of(entity).to_string(),
            text: entity.description.clone(),
            vector,
            attributes: json!({
                "title": entity.name,
                "entity_id": entity.id,
            }),
        }
    }

    /// Upsert every entity; returns the number of records written
    #[instrument(skip(self, entities), fields(entities = entities.len(), store = self.store.name()))]
    pub async fn index(&self, entities: &[Entity]) -> Result<usize> {
        let mut records = Vec::with_capacity(entities.len());
        let mut pending: Vec<&Entity> = Vec::new();

        for entity in entities {
            match &entity.description_embedding {
                Some(vector) => records.push(self.record(entity, vector.clone())),
                None if entity.description.trim().is_empty() => {
                    warn!(entity = %entity.id, "Entity has no description, not indexed");
                }
                None => pending.push(entity),
            }
        }

        if !pending.is_empty() {
            info!(count = pending.len(), "Embedding entity descriptions");
            let embedder = self.embedder.as_ref();
            let batches: Vec<Vec<Vec<f32>>> = stream::iter(pending.chunks(self.batch_size))
                .map(|batch| async move {
                    let texts: Vec<String> =
                        batch.iter().map(|e| e.description.clone()).collect();
                    debug!(batch_size = texts.len(), "Embedding batch");
                    embedder.embed_batch(&texts).await
                })
                .buffered(EMBED_CONCURRENCY)
                .try_collect()
                .await?;

            let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
            if vectors.len() != pending.len() {
                return Err(AppError::integrity(format!(
                    "embedder returned {} vectors for {} descriptions",
                    vectors.len(),
                    pending.len()
                )));
            }
            for (entity, vector) in pending.iter().zip(vectors) {
                records.push(self.record(entity, vector));
            }
        }

        for chunk in records.chunks(self.batch_size) {
            self.store.upsert(chunk).await?;
        }

        info!(records = records.len(), "Entities indexed");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphsearch_common::llm::mock::MockEmbedder;
    use async_trait::async_trait;
    use graphsearch_common::vector_store::InMemoryVectorStore;

    /// Drops the last vector of every batch
    struct ShortEmbedder(MockEmbedder);

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut vectors = self.0.embed_batch(texts).await?;
            vectors.pop();
            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    #[tokio::test]
    async fn test_index_embeds_missing_descriptions() {
        let kb = fixtures::abc_knowledge_base();
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(fixtures::abc_embedder());
        let indexer = EntityIndexer::new(store.clone(), embedder.clone(), EntityKey::Id, 2);

        let written = indexer.index(kb.entities()).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(store.len().await, 3);
        // One embedding per description, in two batches
        assert_eq!(embedder.calls(), 3);

        let hits = store
            .similarity_search_by_vector(&[0.0, 1.0, 0.0], 1)
            .await
            .unwrap();
        assert_eq!(hits[0].record.id, "eb");
        assert_eq!(hits[0].record.attributes["title"], "B");
    }

    #[tokio::test]
    async fn test_index_is_idempotent_and_keyed_by_title() {
        let mut entities = fixtures::abc_knowledge_base().entities().to_vec();
        entities[0].description_embedding = Some(vec![1.0, 0.0, 0.0]);
        entities[2].description = "   ".into();

        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(fixtures::abc_embedder());
        let indexer = EntityIndexer::new(store.clone(), embedder.clone(), EntityKey::Title, 16);

        assert_eq!(indexer.index(&entities).await.unwrap(), 2);
        assert_eq!(indexer.index(&entities).await.unwrap(), 2);
        assert_eq!(store.len().await, 2);

        let hits = store
            .similarity_search_by_vector(&[1.0, 0.0, 0.0], 2)
            .await
            .unwrap();
        assert_eq!(hits[0].record.id, "A");
        assert_eq!(hits[0].record.attributes["entity_id"], "ea");
    }

    #[tokio::test]
    async fn test_index_rejects_wrong_dimension() {
        let mut entities = fixtures::abc_knowledge_base().entities().to_vec();
        entities[1].description_embedding = Some(vec![1.0, 0.0]);

        let store = Arc::new(InMemoryVectorStore::with_dimension(3));
        let indexer = EntityIndexer::new(store, Arc::new(MockEmbedder::new(3)), EntityKey::Id, 16);

        let err = indexer.index(&entities).await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_short_embedding_batch_is_integrity_error() {
        let kb = fixtures::abc_knowledge_base();
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(ShortEmbedder(fixtures::abc_embedder()));
        let indexer = EntityIndexer::new(store.clone(), embedder, EntityKey::Id, 16);

        let err = indexer.index(kb.entities()).await.unwrap_err();
        assert!(matches!(err, AppError::DataIntegrity { .. }));
        assert_eq!(store.len().await, 0);
    }
}
