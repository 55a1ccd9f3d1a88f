//! Local Context Builder
//!
//! Assembles one token-budgeted evidence context per query from:
//! - Conversation history (most recent turns)
//! - Community reports covering the matched entities
//! - Matched entities and their relationships
//! - Source text units
//!
//! Budget policy: history is rendered first against the full budget; the
//! remainder is split by the normalised community / local / text unit
//! shares. A final pass measures the joined text and drops trailing rows
//! until it fits.

mod entities;
mod history;
mod relationships;
mod reports;
mod table;
mod text_units;

pub use history::{ConversationHistory, ConversationTurn};

use graphsearch_common::config::LocalContextParams;
use graphsearch_common::knowledge::Entity;
use graphsearch_common::{metrics, Embedder, KnowledgeBase, Result, Tokenizer, VectorStore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use validator::Validate;

/// Evidence category, declared in rendering order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextCategory {
    ConversationHistory,
    Reports,
    Entities,
    Relationships,
    Sources,
}

impl ContextCategory {
    /// Block title
    pub fn title(&self) -> &'static str {
        match self {
            ContextCategory::ConversationHistory => "Conversation History",
            ContextCategory::Reports => "Reports",
            ContextCategory::Entities => "Entities",
            ContextCategory::Relationships => "Relationships",
            ContextCategory::Sources => "Sources",
        }
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            ContextCategory::ConversationHistory => "conversation_history",
            ContextCategory::Reports => "reports",
            ContextCategory::Entities => "entities",
            ContextCategory::Relationships => "relationships",
            ContextCategory::Sources => "sources",
        }
    }

    /// Order in which the final pass removes rows
    const TRUNCATION_ORDER: [ContextCategory; 5] = [
        ContextCategory::Sources,
        ContextCategory::Relationships,
        ContextCategory::Entities,
        ContextCategory::Reports,
        ContextCategory::ConversationHistory,
    ];
}

/// One rendered row and the knowledge base record behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextRecord {
    pub id: String,
    pub row: String,
    /// False for candidates that were budgeted out
    pub in_context: bool,
}

/// Rows of one evidence category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    pub category: ContextCategory,
    /// Column header line
    pub header: String,
    pub records: Vec<ContextRecord>,
}

impl ContextBlock {
    pub(crate) fn new(category: ContextCategory, header: String) -> Self {
        Self {
            category,
            header,
            records: Vec::new(),
        }
    }

    pub(crate) fn title_line(&self) -> String {
        format!("-----{}-----", self.category.title())
    }

    /// Records that made it into the context
    pub fn included(&self) -> impl Iterator<Item = &ContextRecord> {
        self.records.iter().filter(|r| r.in_context)
    }

    pub fn is_empty(&self) -> bool {
        self.included().next().is_none()
    }

    /// Title, column header and included rows
    pub fn render(&self) -> String {
        let mut lines = vec![self.title_line(), self.header.clone()];
        lines.extend(self.included().map(|r| r.row.clone()));
        lines.join("\n")
    }

    /// Drop the last included row; false when nothing is left
    fn drop_last(&mut self, keep_candidate: bool) -> bool {
        let Some(pos) = self.records.iter().rposition(|r| r.in_context) else {
            return false;
        };
        if keep_candidate {
            self.records[pos].in_context = false;
        } else {
            self.records.remove(pos);
        }
        true
    }
}

/// Evidence context assembled for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    blocks: Vec<ContextBlock>,
    text: String,
    token_count: usize,
}

impl AssembledContext {
    /// Context with no blocks
    pub fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            text: String::new(),
            token_count: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Blocks in rendering order, including those holding only candidates
    pub fn blocks(&self) -> &[ContextBlock] {
        &self.blocks
    }

    pub fn block(&self, category: ContextCategory) -> Option<&ContextBlock> {
        self.blocks.iter().find(|b| b.category == category)
    }

    /// Ids of the records of `category` that are in the context
    pub fn ids(&self, category: ContextCategory) -> Vec<&str> {
        self.block(category)
            .map(|b| b.included().map(|r| r.id.as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether any report, entity, relationship or source made it in
    pub fn has_evidence(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| b.category != ContextCategory::ConversationHistory && !b.is_empty())
    }

    /// SHA-256 of the context text, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }

    fn render(blocks: &[ContextBlock]) -> String {
        blocks
            .iter()
            .filter(|b| !b.is_empty())
            .map(ContextBlock::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Builds [`AssembledContext`]s against a shared knowledge base and entity store
pub struct LocalContextBuilder {
    kb: Arc<KnowledgeBase>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl LocalContextBuilder {
    pub fn new(
        kb: Arc<KnowledgeBase>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            kb,
            store,
            embedder,
            tokenizer,
        }
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Assemble the context for `query`.
    ///
    /// Previous user questions from `history` are appended to the query
    /// before entity mapping and rendered as the conversation block.
    #[instrument(skip(self, history, params), fields(max_tokens = params.max_tokens))]
    pub async fn build(
        &self,
        query: &str,
        history: Option<&ConversationHistory>,
        params: &LocalContextParams,
    ) -> Result<AssembledContext> {
        params.validate()?;
        let kb = self.kb.as_ref();
        let tokenizer = self.tokenizer.as_ref();
        let keep = params.return_candidate_context;

        let mut blocks = Vec::new();
        let mut remaining = params.max_tokens;

        let mut search_text = query.to_string();
        if let Some(history) = history.filter(|h| !h.is_empty()) {
            let (block, tokens) = history.build_block(params, tokenizer, remaining);
            remaining = remaining.saturating_sub(tokens);
            blocks.push(block);

            let previous = history.user_questions(params.conversation_history_max_turns);
            if !previous.is_empty() {
                search_text = format!("{}\n{}", query, previous.join("\n"));
            }
        }

        let mut selected = entities::map_query_to_entities(
            search_text.trim(),
            kb,
            self.store.as_ref(),
            self.embedder.as_ref(),
            params,
        )
        .await?;
        entities::order_by_rank(kb, &mut selected);

        let (community_budget, local_budget, text_unit_budget) =
            params.budget_shares().allocate(remaining);
        debug!(
            remaining,
            community_budget, local_budget, text_unit_budget, "Budget allocated"
        );

        let (report_block, _) =
            reports::build_report_block(kb, &selected, params, tokenizer, community_budget);
        blocks.push(report_block);

        let (entity_block, relationship_block) =
            self.build_local_blocks(&selected, params, local_budget);
        blocks.push(entity_block);
        blocks.push(relationship_block);

        // Only entities that made it into the context contribute sources
        let included: HashSet<&str> = blocks
            .iter()
            .filter(|b| b.category == ContextCategory::Entities)
            .flat_map(|b| b.included().map(|r| r.id.as_str()))
            .collect();
        let in_context: Vec<&Entity> = selected
            .iter()
            .copied()
            .filter(|e| included.contains(e.id.as_str()))
            .collect();
        let (sources, _) = text_units::build_text_unit_block(
            kb,
            &in_context,
            params,
            tokenizer,
            text_unit_budget,
        );
        blocks.push(sources);

        let context = self.enforce_budget(blocks, params.max_tokens, keep);
        for block in &context.blocks {
            metrics::record_context_tokens(
                block.category.label(),
                if block.is_empty() {
                    0
                } else {
                    tokenizer.count(&block.render())
                },
            );
        }

        info!(
            entities = context.ids(ContextCategory::Entities).len(),
            relationships = context.ids(ContextCategory::Relationships).len(),
            reports = context.ids(ContextCategory::Reports).len(),
            sources = context.ids(ContextCategory::Sources).len(),
            tokens = context.token_count,
            "Context assembled"
        );
        Ok(context)
    }

    /// Entities and relationships sharing the local budget.
    ///
    /// Entities are added one at a time in rank order together with their
    /// relationships; the last prefix that fits wins.
    fn build_local_blocks(
        &self,
        selected: &[&Entity],
        params: &LocalContextParams,
        budget: usize,
    ) -> (ContextBlock, ContextBlock) {
        let kb = self.kb.as_ref();
        let tokenizer = self.tokenizer.as_ref();

        let mut fitted = 0;
        for n in 1..=selected.len() {
            let prefix = &selected[..n];
            let tokens = entities::entity_block(prefix, params, tokenizer).tokens()
                + relationships::relationship_block(kb, prefix, params, tokenizer).tokens();
            if tokens > budget {
                debug!(
                    kept = fitted,
                    candidates = selected.len(),
                    budget,
                    "Local context truncated"
                );
                break;
            }
            fitted = n;
        }

        let (mut entity_block, _) =
            entities::entity_block(&selected[..fitted], params, tokenizer).finish();
        let (mut relationship_block, _) =
            relationships::relationship_block(kb, &selected[..fitted], params, tokenizer).finish();

        if params.return_candidate_context && fitted < selected.len() {
            let (all_entities, _) = entities::entity_block(selected, params, tokenizer).finish();
            let (all_relationships, _) =
                relationships::relationship_block(kb, selected, params, tokenizer).finish();
            append_candidates(&mut entity_block, all_entities);
            append_candidates(&mut relationship_block, all_relationships);
        }

        (entity_block, relationship_block)
    }

    /// Drop trailing rows until the joined text fits `max_tokens`
    fn enforce_budget(
        &self,
        mut blocks: Vec<ContextBlock>,
        max_tokens: usize,
        keep_candidates: bool,
    ) -> AssembledContext {
        let tokenizer = self.tokenizer.as_ref();
        let mut dropped = 0usize;

        let (text, token_count) = loop {
            let text = AssembledContext::render(&blocks);
            let tokens = tokenizer.count(&text);
            if tokens <= max_tokens {
                break (text, tokens);
            }

            let removed = ContextCategory::TRUNCATION_ORDER.iter().any(|category| {
                blocks
                    .iter_mut()
                    .find(|b| b.category == *category && !b.is_empty())
                    .is_some_and(|b| b.drop_last(keep_candidates))
            });
            if !removed {
                break (String::new(), 0);
            }
            dropped += 1;
        };

        if dropped > 0 {
            debug!(dropped, max_tokens, "Rows dropped by final budget pass");
        }

        blocks.retain(|b| !b.records.is_empty());
        blocks.sort_by_key(|b| b.category);

        AssembledContext {
            blocks,
            text,
            token_count,
        }
    }
}

/// Append the records of `all` missing from `block` as out-of-context candidates
fn append_candidates(block: &mut ContextBlock, all: ContextBlock) {
    let present: HashSet<String> = block.records.iter().map(|r| r.id.clone()).collect();
    block.records.extend(
        all.records
            .into_iter()
            .filter(|r| !present.contains(&r.id))
            .map(|r| ContextRecord {
                in_context: false,
                ..r
            }),
    );
}
