//! Offline model doubles
//!
//! Deterministic stand-ins for the chat and embedding endpoints, used by the
//! test suites and by local runs without network access.

use super::{ChatMessage, ChatModel, Embedder, GenerationParams};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Embedder deriving unit vectors from a hash of the text.
///
/// Equal texts always map to equal vectors. Individual texts can be pinned
/// to fixed vectors to control nearest-neighbour results.
pub struct MockEmbedder {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Pin `text` to `vector`
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.into(), vector);
        self
    }

    /// Number of texts embedded so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut block = 0u32;
        while vector.len() < self.dimension {
            let digest = Sha256::new()
                .chain_update(block.to_le_bytes())
                .chain_update(text.as_bytes())
                .finalize();
            vector.extend(
                digest
                    .iter()
                    .take(self.dimension - vector.len())
                    .map(|&b| b as f32 / 127.5 - 1.0),
            );
            block += 1;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let vector = match self.fixed.get(text) {
            Some(v) => v.clone(),
            None => self.hashed(text),
        };
        if vector.len() != self.dimension {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Chat model replaying a queue of canned outcomes
#[derive(Default)]
pub struct ScriptedChatModel {
    script: Mutex<VecDeque<Result<String>>>,
    received: Mutex<Vec<Vec<ChatMessage>>>,
    calls: AtomicUsize,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failure
    pub fn fail(self, error: AppError) -> Self {
        self.push(Err(error))
    }

    fn push(mut self, outcome: Result<String>) -> Self {
        self.script.get_mut().push_back(outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received so far, oldest first
    pub async fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().await.push(messages.to_vec());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::ModelRequest {
                    status: 500,
                    message: "scripted chat model has no replies left".to_string(),
                })
            })
    }

    fn model_name(&self) -> &str {
        "scripted-chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new(48);
        let a = embedder.embed("Leonardo").await.unwrap();
        let b = embedder.embed("Leonardo").await.unwrap();
        let c = embedder.embed("Florence").await.unwrap();

        assert_eq!(a.len(), 48);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_embedder_pinned_vectors() {
        let embedder = MockEmbedder::new(3)
            .with_vector("painter", vec![1.0, 0.0, 0.0])
            .with_vector("broken", vec![1.0]);

        let batch = embedder
            .embed_batch(&["painter".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(batch[0], vec![1.0, 0.0, 0.0]);
        assert_eq!(batch[1].len(), 3);

        let err = embedder.embed("broken").await.unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { expected: 3, actual: 1 }));
    }

    #[tokio::test]
    async fn test_scripted_chat_model() {
        let model = ScriptedChatModel::new()
            .reply("first")
            .fail(AppError::ModelUnavailable {
                operation: "chat".into(),
                attempts: 20,
                message: "rate limited".into(),
            });
        let params = GenerationParams::default();

        let out = model.complete(&[ChatMessage::user("hi")], &params).await.unwrap();
        assert_eq!(out, "first");
        assert!(model.complete(&[], &params).await.is_err());
        assert!(model.complete(&[], &params).await.is_err());

        assert_eq!(model.calls(), 3);
        let received = model.received().await;
        assert_eq!(received[0][0].content, "hi");
    }
}
