//! Process-local embedding store

use super::{cosine_similarity, ScoredRecord, VectorRecord, VectorStore};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    positions: HashMap<String, usize>,
}

/// In-memory store with exact cosine search.
///
/// Overwriting an id keeps its original insertion slot, so equal scores
/// always resolve in first-insert order.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    /// Store whose dimension is fixed by the first upsert
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                dimension: Some(dimension),
                ..Default::default()
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AppError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Validate the whole batch before touching state
        let expected = inner
            .dimension
            .or_else(|| records.first().map(|r| r.vector.len()));
        if let Some(expected) = expected {
            for record in records {
                check_dimension(expected, record.vector.len())?;
            }
            inner.dimension = Some(expected);
        }

        for record in records {
            match inner.positions.get(&record.id).copied() {
                Some(pos) => inner.records[pos] = record.clone(),
                None => {
                    let pos = inner.records.len();
                    inner.positions.insert(record.id.clone(), pos);
                    inner.records.push(record.clone());
                }
            }
        }
        Ok(())
    }

    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let start = Instant::now();
        let inner = self.inner.read().await;
        if let Some(expected) = inner.dimension {
            check_dimension(expected, query.len())?;
        }

        let mut scored: Vec<(usize, f32)> = inner
            .records
            .iter()
            .enumerate()
            .map(|(pos, r)| (pos, cosine_similarity(query, &r.vector)))
            .collect();
        // Stable: equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let results = scored
            .into_iter()
            .take(k)
            .map(|(pos, score)| ScoredRecord {
                record: inner.records[pos].clone(),
                score,
            })
            .collect();

        metrics::record_vector_query(self.name(), start.elapsed().as_secs_f64());
        Ok(results)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
