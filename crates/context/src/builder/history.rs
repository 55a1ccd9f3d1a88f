//! Conversation history and its context block

use super::table::{self, BlockBuilder};
use super::{ContextBlock, ContextCategory};
use graphsearch_common::config::LocalContextParams;
use graphsearch_common::llm::Role;
use graphsearch_common::Tokenizer;
use serde::{Deserialize, Serialize};

/// One message of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Ordered conversation, oldest turn first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

/// A user question with the responses that followed it
struct QaTurn<'a> {
    question: Option<&'a str>,
    answers: Vec<&'a str>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History made only of user questions
    pub fn from_user_questions<I, S>(questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut history = Self::new();
        for question in questions {
            history.push(Role::User, question);
        }
        history
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Up to `max` user questions, most recent first
    pub fn user_questions(&self, max: usize) -> Vec<&str> {
        self.turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .take(max)
            .collect()
    }

    fn qa_turns(&self) -> Vec<QaTurn<'_>> {
        let mut qa: Vec<QaTurn<'_>> = Vec::new();
        for turn in &self.turns {
            match turn.role {
                Role::User => qa.push(QaTurn {
                    question: Some(&turn.content),
                    answers: Vec::new(),
                }),
                Role::Assistant | Role::System => match qa.last_mut() {
                    Some(current) => current.answers.push(&turn.content),
                    None => qa.push(QaTurn {
                        question: None,
                        answers: vec![&turn.content],
                    }),
                },
            }
        }
        qa
    }

    /// Render the most recent question/answer turns, newest first.
    ///
    /// Whole turns are added until the next one would exceed `budget`.
    pub(crate) fn build_block(
        &self,
        params: &LocalContextParams,
        tokenizer: &dyn Tokenizer,
        budget: usize,
    ) -> (ContextBlock, usize) {
        let delimiter = params.column_delimiter.as_str();
        let header = table::header(&["turn", "content"], delimiter);
        let mut builder = BlockBuilder::new(
            ContextCategory::ConversationHistory,
            header.clone(),
            tokenizer,
            budget,
            false,
        );

        let qa = self.qa_turns();
        let user_only = params.conversation_history_user_turns_only;
        let recent = qa
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, turn)| !(user_only && turn.question.is_none()))
            .take(params.conversation_history_max_turns);

        for (index, turn) in recent {
            let mut rows: Vec<(String, String)> = Vec::new();
            if let Some(question) = turn.question {
                rows.push((
                    format!("turn-{}-user", index),
                    table::row(&["user".to_string(), question.to_string()], delimiter),
                ));
            }
            if !user_only {
                for (n, answer) in turn.answers.iter().enumerate() {
                    rows.push((
                        format!("turn-{}-assistant-{}", index, n),
                        table::row(&["assistant".to_string(), answer.to_string()], delimiter),
                    ));
                }
            }

            // Turns are all-or-nothing
            if !builder.fits(rows.iter().map(|(_, row)| row.as_str())) {
                break;
            }
            for (id, row) in rows {
                builder.push(id, row);
            }
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsearch_common::tokenizer::ApproxTokenizer;

    fn dialogue() -> ConversationHistory {
        let mut history = ConversationHistory::new();
        history.push(Role::User, "Who was Leonardo?");
        history.push(Role::Assistant, "A painter.");
        history.push(Role::User, "Where did he work?");
        history.push(Role::Assistant, "Florence and Milan.");
        history.push(Role::User, "What did he paint?");
        history
    }

    fn ids(block: &ContextBlock) -> Vec<&str> {
        block.records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_user_questions_most_recent_first() {
        let history = dialogue();
        assert_eq!(
            history.user_questions(2),
            vec!["What did he paint?", "Where did he work?"]
        );
        assert_eq!(history.user_questions(10).len(), 3);
    }

    #[test]
    fn test_user_only_block() {
        let params = LocalContextParams {
            conversation_history_max_turns: 2,
            ..Default::default()
        };
        let (block, tokens) = dialogue().build_block(&params, &ApproxTokenizer, 1000);

        assert_eq!(ids(&block), vec!["turn-2-user", "turn-1-user"]);
        assert_eq!(block.records[0].row, "user|What did he paint?");
        assert!(tokens > 0);
    }

    #[test]
    fn test_block_with_answers() {
        let params = LocalContextParams {
            conversation_history_user_turns_only: false,
            ..Default::default()
        };
        let (block, _) = dialogue().build_block(&params, &ApproxTokenizer, 1000);
        assert_eq!(
            ids(&block),
            vec![
                "turn-2-user",
                "turn-1-user",
                "turn-1-assistant-0",
                "turn-0-user",
                "turn-0-assistant-0",
            ]
        );
    }

    #[test]
    fn test_turns_are_not_split() {
        let params = LocalContextParams {
            conversation_history_user_turns_only: false,
            ..Default::default()
        };
        let tokenizer = ApproxTokenizer;
        let (full, full_tokens) = dialogue().build_block(&params, &tokenizer, 1000);
        let (partial, tokens) = dialogue().build_block(&params, &tokenizer, full_tokens - 1);

        assert!(tokens < full_tokens);
        assert!(partial.records.len() < full.records.len());
        // The newest turn has no answer yet, the next one is question plus answer
        assert_eq!(ids(&partial), vec!["turn-2-user", "turn-1-user", "turn-1-assistant-0"]);
    }

    #[test]
    fn test_empty_history_and_zero_turns() {
        let params = LocalContextParams::default();
        let (block, tokens) = ConversationHistory::new().build_block(&params, &ApproxTokenizer, 100);
        assert!(block.records.is_empty());
        assert_eq!(tokens, 0);

        let params = LocalContextParams {
            conversation_history_max_turns: 0,
            ..Default::default()
        };
        let (block, _) = dialogue().build_block(&params, &ApproxTokenizer, 100);
        assert!(block.records.is_empty());
    }
}
