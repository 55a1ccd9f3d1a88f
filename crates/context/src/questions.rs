//! Follow-up question generation
//!
//! Proposes the questions a user is likely to ask next, grounded in the
//! same local context a search would use. Callers that already hold a
//! context for the current question can pass it in to skip rebuilding.

use crate::builder::{AssembledContext, ConversationHistory, LocalContextBuilder};
use crate::prompts;
use graphsearch_common::config::{GenerationParams, LocalContextParams};
use graphsearch_common::llm::ChatMessage;
use graphsearch_common::{metrics, AppError, ChatModel, Result};
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Candidate follow-up questions and the context behind them
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSet {
    pub questions: Vec<String>,
    pub context: AssembledContext,
    pub completion_time: Duration,
    pub llm_calls: usize,
    pub prompt_tokens: usize,
}

/// Extract up to `limit` distinct questions from a model response.
///
/// Lines are stripped of list markers and quotes; a line is kept when what
/// remains ends with a question mark. Fails only if nothing is kept.
pub fn parse_questions(raw: &str, limit: usize) -> Result<Vec<String>> {
    // Bullets and numbered list markers
    let marker = Regex::new(r"^(?:[-*•]|\d+[.)])\s*")
        .map_err(|e| AppError::Other(anyhow::anyhow!(e)))?;
    let mut seen = HashSet::new();
    let mut questions = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        let line = marker.replace(line, "");
        let question = line
            .trim()
            .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
            .trim();

        if question.is_empty() || !question.ends_with('?') {
            if !question.is_empty() {
                debug!(line = question, "Dropping non-question line");
            }
            continue;
        }
        if !seen.insert(question.to_lowercase()) {
            continue;
        }
        questions.push(question.to_string());
        if questions.len() == limit {
            break;
        }
    }

    if questions.is_empty() {
        return Err(AppError::NoValidQuestions {
            raw: raw.to_string(),
        });
    }
    Ok(questions)
}

/// Question generator over the local context
pub struct LocalQuestionGen {
    model: Arc<dyn ChatModel>,
    builder: Arc<LocalContextBuilder>,
    context_params: LocalContextParams,
    generation: GenerationParams,
}

impl LocalQuestionGen {
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

    /// Generate up to `desired_count` follow-up questions.
    ///
    /// The last entry of `history` is the current question and earlier
    /// entries are previous user turns. A supplied `context` is used as is.
    #[instrument(skip(self, history, context), fields(request_id = %Uuid::new_v4(), turns = history.len()))]
    pub async fn generate(
        &self,
        history: &[String],
        context: Option<AssembledContext>,
        desired_count: usize,
    ) -> Result<QuestionSet> {
        if desired_count == 0 {
            return Err(AppError::Validation {
                message: "desired question count must be at least 1".to_string(),
            });
        }
        self.generation.validate()?;
        let start = Instant::now();

        let (current, previous) = match history.split_last() {
            Some((current, previous)) => (current.as_str(), previous),
            None => ("", history),
        };

        let context = match context {
            Some(context) => context,
            None => {
                let previous = ConversationHistory::from_user_questions(previous.iter().cloned());
                self.builder
                    .build(current, Some(&previous), &self.context_params)
                    .await?
            }
        };

        let system = prompts::question_prompt(context.text(), desired_count);
        let tokenizer = self.builder.tokenizer();
        let prompt_tokens = tokenizer.count(&system) + tokenizer.count(current);
        let mut messages = vec![ChatMessage::system(system)];
        if !current.trim().is_empty() {
            messages.push(ChatMessage::user(current));
        }

        let raw = self.model.complete(&messages, &self.generation).await?;
        let questions = parse_questions(&raw, desired_count)?;
        if questions.len() < desired_count {
            warn!(
                requested = desired_count,
                returned = questions.len(),
                "Fewer questions than requested"
            );
        }

        let completion_time = start.elapsed();
        metrics::record_question_generation(questions.len());
        info!(
            questions = questions.len(),
            elapsed_ms = completion_time.as_millis() as u64,
            "Questions generated"
        );

        Ok(QuestionSet {
            questions,
            context,
            completion_time,
            llm_calls: 1,
            prompt_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphsearch_common::llm::mock::{MockEmbedder, ScriptedChatModel};

    async fn generator(
        model: Arc<ScriptedChatModel>,
    ) -> (LocalQuestionGen, Arc<LocalContextBuilder>, Arc<MockEmbedder>) {
        let (builder, embedder) = fixtures::abc_builder().await;
        let builder = Arc::new(builder);
        let generator = LocalQuestionGen::new(
            model,
            builder.clone(),
            LocalContextParams::default(),
            GenerationParams::default(),
        );
        (generator, builder, embedder)
    }

    #[test]
    fn test_parse_strips_markers_and_quotes() {
        let raw = "Here are some questions:\n\
                   - What did A build?\n\
                   * \"Who taught B?\"\n\
                   3. Where did C live?\n\
                   4) where did c live?\n\
                   • How are A and B related?\n\
                   Not a question.";
        let questions = parse_questions(raw, 10).unwrap();
        assert_eq!(
            questions,
            vec![
                "What did A build?",
                "Who taught B?",
                "Where did C live?",
                "How are A and B related?",
            ]
        );

        assert_eq!(parse_questions(raw, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_without_questions_fails() {
        let err = parse_questions("Sorry, I cannot help.\n- nothing here", 5).unwrap_err();
        assert!(matches!(err, AppError::NoValidQuestions { .. }));
    }

    #[tokio::test]
    async fn test_fewer_questions_than_requested() {
        let model = Arc::new(
            ScriptedChatModel::new().reply("- Who is A?\n- What does B do?\n- Where is C?\n- A and B"),
        );
        let (generator, _, _) = generator(model.clone()).await;
        let history = vec!["Tell me about A".to_string(), "tell me about A".to_string()];

        let set = generator.generate(&history, None, 5).await.unwrap();
        assert_eq!(set.questions.len(), 3);
        assert_eq!(set.llm_calls, 1);

        let received = model.received().await;
        assert!(received[0][0].content.contains("write 5 candidate questions"));
        assert_eq!(received[0][1], ChatMessage::user("tell me about A"));
        assert!(set.context.block(crate::ContextCategory::ConversationHistory).is_some());
    }

    #[tokio::test]
    async fn test_reused_context_skips_embedding() {
        let model = Arc::new(ScriptedChatModel::new().reply("1. Who is B?"));
        let (generator, builder, embedder) = generator(model).await;

        let context = builder
            .build("tell me about A", None, &LocalContextParams::default())
            .await
            .unwrap();
        let before = embedder.calls();

        let set = generator
            .generate(&["tell me about A".to_string()], Some(context.clone()), 3)
            .await
            .unwrap();
        assert_eq!(set.questions, vec!["Who is B?"]);
        assert_eq!(set.context, context);
        assert_eq!(embedder.calls(), before);
    }

    #[tokio::test]
    async fn test_zero_count_rejected() {
        let model = Arc::new(ScriptedChatModel::new());
        let (generator, _, _) = generator(model.clone()).await;

        let err = generator.generate(&[], None, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_response_is_error() {
        let model = Arc::new(ScriptedChatModel::new().reply("I have no suggestions."));
        let (generator, _, _) = generator(model).await;

        let err = generator.generate(&[], None, 5).await.unwrap_err();
        assert!(matches!(err, AppError::NoValidQuestions { ref raw } if raw.contains("no suggestions")));
    }
}
