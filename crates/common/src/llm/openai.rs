//! OpenAI-compatible chat and embedding client
//!
//! One HTTP client serves both capabilities; every request goes through the
//! shared [`RetryPolicy`].

use super::{ChatMessage, ChatModel, Embedder, GenerationParams, RetryPolicy};
use crate::config::{EmbeddingConfig, LlmConfig};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Model client for an OpenAI-compatible API
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIClient {
    /// Create a client; fails when no API key is configured
    pub fn new(llm: &LlmConfig, embedding: &EmbeddingConfig) -> Result<Self> {
        let api_key = llm
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::config("language model API key is not set"))?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(llm.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: llm.api_base.trim_end_matches('/').to_string(),
            chat_model: llm.model.clone(),
            embedding_model: embedding.model.clone(),
            dimension: embedding.dimension,
            batch_size: embedding.batch_size.max(1),
            retry: RetryPolicy::from(&llm.retry),
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Transport {
                operation: operation.to_string(),
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(operation, status, retry_after, body));
        }

        response.json::<R>().await.map_err(|e| AppError::ModelRequest {
            status: status.as_u16(),
            message: format!("Failed to parse response: {}", e),
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.embedding_model,
        };
        let request = &request;
        let this = self;

        let mut response: EmbeddingResponse = self
            .retry
            .run("embedding", move || this.post("embedding", "embeddings", request))
            .await?;

        if response.data.len() != texts.len() {
            return Err(AppError::ModelRequest {
                status: 200,
                message: format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    response.data.len()
                ),
            });
        }

        response.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = response.data.into_iter().map(|d| d.embedding).collect();

        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

/// Map a non-success HTTP status to the error taxonomy
fn classify_status(
    operation: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
) -> AppError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited {
            operation: operation.to_string(),
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT => AppError::Transport {
            operation: operation.to_string(),
            message: format!("API error {}: {}", status, body),
        },
        s if s.is_server_error() => AppError::Transport {
            operation: operation.to_string(),
            message: format!("API error {}: {}", status, body),
        },
        _ => AppError::ModelRequest {
            status: status.as_u16(),
            message: body,
        },
    }
}

#[async_trait]
impl ChatModel for OpenAIClient {
    #[instrument(skip(self, messages, params), fields(model = %self.chat_model))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };
        let request = &request;
        let this = self;

        let start = Instant::now();
        let result: Result<ChatResponse> = self
            .retry
            .run("chat", move || this.post("chat", "chat/completions", request))
            .await;
        metrics::record_model_call("chat", &self.chat_model, start.elapsed().as_secs_f64(), result.is_ok());

        let response = result?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::ModelRequest {
                status: 200,
                message: "Empty response from chat model".to_string(),
            })?;

        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl Embedder for OpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ModelRequest {
                status: 200,
                message: "Empty embedding response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let start = Instant::now();
            let result = self.embed_chunk(chunk).await;
            metrics::record_model_call(
                "embedding",
                &self.embedding_model,
                start.elapsed().as_secs_f64(),
                result.is_ok(),
            );
            all_embeddings.extend(result?);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client_for(server: &MockServer, max_attempts: u32) -> OpenAIClient {
        let llm = LlmConfig {
            api_key: Some("sk-test".into()),
            api_base: server.base_url(),
            retry: RetryConfig {
                max_attempts,
                initial_interval_ms: 1,
                max_interval_ms: 2,
                multiplier: 1.0,
                max_elapsed_secs: 30,
            },
            ..Default::default()
        };
        let embedding = EmbeddingConfig {
            dimension: 2,
            ..Default::default()
        };
        OpenAIClient::new(&llm, &embedding).unwrap()
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let err = OpenAIClient::new(&LlmConfig::default(), &EmbeddingConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));

        let blank = LlmConfig {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        assert!(OpenAIClient::new(&blank, &EmbeddingConfig::default()).is_err());
    }

    #[test]
    fn test_client_from_config() {
        let llm = LlmConfig {
            api_key: Some("sk-test".into()),
            api_base: "http://localhost:8080/v1/".into(),
            ..Default::default()
        };
        let client = OpenAIClient::new(&llm, &EmbeddingConfig::default()).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(ChatModel::model_name(&client), "gpt-3.5-turbo");
        assert_eq!(Embedder::model_name(&client), "text-embedding-3-small");
        assert_eq!(client.retry.max_attempts, 20);
    }

    #[test]
    fn test_status_classification() {
        let rate = classify_status(
            "chat",
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(3)),
            String::new(),
        );
        assert!(rate.is_transient());
        assert_eq!(rate.retry_after(), Some(Duration::from_secs(3)));

        let server = classify_status("chat", StatusCode::BAD_GATEWAY, None, "oops".into());
        assert!(server.is_transient());

        let auth = classify_status("chat", StatusCode::UNAUTHORIZED, None, "bad key".into());
        assert!(!auth.is_transient());
        assert!(matches!(auth, AppError::ModelRequest { status: 401, .. }));

        let malformed = classify_status("embedding", StatusCode::BAD_REQUEST, None, "bad input".into());
        assert!(!malformed.is_transient());
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![ChatMessage::system("ctx"), ChatMessage::user("q")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            max_tokens: 2000,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "q");
        assert_eq!(json["max_tokens"], 2000);
    }

    #[tokio::test]
    async fn test_complete_over_http() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"content": "Florence"}}]}));
            })
            .await;

        let client = client_for(&server, 3);
        let answer = client
            .complete(&[ChatMessage::user("Where?")], &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(answer, "Florence");
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).header("Retry-After", "0").body("slow down");
            })
            .await;

        let client = client_for(&server, 3);
        let err = client
            .complete(&[ChatMessage::user("Where?")], &GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ModelUnavailable { attempts: 3, .. }));
        assert_eq!(mock.hits_async().await, 3);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let client = client_for(&server, 5);
        let err = client
            .complete(&[ChatMessage::user("Where?")], &GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ModelRequest { status: 401, .. }));
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_embeddings_reordered_by_index() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}));
            })
            .await;

        let client = client_for(&server, 3);
        let vectors = client
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
