//! GraphSearch Context Engine
//!
//! Local search over an indexed knowledge graph:
//! - Token-budgeted context assembly from entities, relationships,
//!   community reports and source text
//! - Grounded answer generation
//! - Follow-up question generation
//! - Entity description indexing into the embedding store

pub mod builder;
pub mod indexer;
pub mod prompts;
pub mod questions;
pub mod search;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::{
    AssembledContext, ContextBlock, ContextCategory, ContextRecord, ConversationHistory,
    ConversationTurn, LocalContextBuilder,
};
pub use indexer::EntityIndexer;
pub use questions::{parse_questions, LocalQuestionGen, QuestionSet};
pub use search::{LocalSearch, SearchResult};
