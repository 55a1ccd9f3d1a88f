//! Local Search Engine
//!
//! Answers one question from the evidence the [`LocalContextBuilder`]
//! assembles around it. The chat model sees a single system message
//! carrying the context tables, followed by the user's question.

use crate::builder::{AssembledContext, ConversationHistory, LocalContextBuilder};
use crate::prompts;
use graphsearch_common::config::{GenerationParams, LocalContextParams};
use graphsearch_common::llm::ChatMessage;
use graphsearch_common::{metrics, ChatModel, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Answer to one search request
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub response: String,
    /// Evidence the answer was generated from
    pub context: AssembledContext,
    /// False when no evidence was found and the model was not called
    pub grounded: bool,
    pub completion_time: Duration,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
}

/// Grounded question answering over the local context
pub struct LocalSearch {
    model: Arc<dyn ChatModel>,
    builder: Arc<LocalContextBuilder>,
    context_params: LocalContextParams,
    generation: GenerationParams,
}

impl LocalSearch {
    pub fn new(
        model: Arc<dyn ChatModel>,
        builder: Arc<LocalContextBuilder>,
        context_params: LocalContextParams,
        generation: GenerationParams,
    ) -> Self {
        Self {
            model,
            builder,
            context_params,
            generation,
        }
    }

    /// Build the context for `query` and answer from it
    #[instrument(skip(self, history), fields(request_id = %Uuid::new_v4()))]
    pub async fn search(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
    ) -> Result<SearchResult> {
        let start = Instant::now();
        let context = self
            .builder
            .build(query, history, &self.context_params)
            .await?;
        self.answer(query, context, start).await
    }

    /// Answer `query` from a context the caller already built
    #[instrument(skip(self, context), fields(request_id = %Uuid::new_v4()))]
    pub async fn search_with_context(
        &self,
        query: &str,
        context: AssembledContext,
    ) -> Result<SearchResult> {
        self.answer(query, context, Instant::now()).await
    }

    async fn answer(
        &self,
        query: &str,
        context: AssembledContext,
        start: Instant,
    ) -> Result<SearchResult> {
        self.generation.validate()?;

        if !context.has_evidence() {
            info!("No grounding found, answering without the model");
            metrics::record_search(start.elapsed().as_secs_f64(), false);
            return Ok(SearchResult {
                response: prompts::NO_GROUNDING_RESPONSE.to_string(),
                context,
                grounded: false,
                completion_time: start.elapsed(),
                llm_calls: 0,
                prompt_tokens: 0,
            });
        }

        let system = prompts::local_search_prompt(context.text(), &self.generation.response_type);
        let tokenizer = self.builder.tokenizer();
        let prompt_tokens = tokenizer.count(&system) + tokenizer.count(query);
        let messages = [ChatMessage::system(system), ChatMessage::user(query)];

        let response = self
            .model
            .complete(&messages, &self.generation)
            .await
            .map_err(|e| {
                error!(error = %e, model = self.model.model_name(), "Search failed");
                e
            })?;

        let completion_time = start.elapsed();
        metrics::record_search(completion_time.as_secs_f64(), true);
        info!(
            prompt_tokens,
            elapsed_ms = completion_time.as_millis() as u64,
            "Search completed"
        );

        Ok(SearchResult {
            response,
            context,
            grounded: true,
            completion_time,
            llm_calls: 1,
            prompt_tokens,
        })
    }
}
