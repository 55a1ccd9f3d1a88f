//! Delimited table rendering with running token accounting

use super::{ContextBlock, ContextCategory, ContextRecord};
use graphsearch_common::Tokenizer;

/// Join cells into one table row; line breaks inside cells become spaces
pub(crate) fn row(cells: &[String], delimiter: &str) -> String {
    cells
        .iter()
        .map(|cell| cell.replace(['\r', '\n'], " "))
        .collect::<Vec<_>>()
        .join(delimiter)
}

pub(crate) fn header(columns: &[&str], delimiter: &str) -> String {
    columns.join(delimiter)
}

/// Fills one block row by row until its token budget is spent.
///
/// Rows that no longer fit are kept as candidates (`in_context = false`)
/// only when `keep_candidates` is set. Once one row is rejected every
/// later row is rejected too, so a block is always a prefix of its ranking.
pub(crate) struct BlockBuilder<'a> {
    block: ContextBlock,
    tokenizer: &'a dyn Tokenizer,
    budget: usize,
    header_tokens: usize,
    row_tokens: usize,
    keep_candidates: bool,
    full: bool,
}

impl<'a> BlockBuilder<'a> {
    pub(crate) fn new(
        category: ContextCategory,
        header: String,
        tokenizer: &'a dyn Tokenizer,
        budget: usize,
        keep_candidates: bool,
    ) -> Self {
        let block = ContextBlock::new(category, header);
        let header_tokens = tokenizer.count(&format!("{}\n{}\n", block.title_line(), block.header));
        Self {
            block,
            tokenizer,
            budget,
            header_tokens,
            row_tokens: 0,
            keep_candidates,
            full: false,
        }
    }

    /// Block without a budget, used when the caller measures the result itself
    pub(crate) fn unbounded(
        category: ContextCategory,
        header: String,
        tokenizer: &'a dyn Tokenizer,
    ) -> Self {
        Self::new(category, header, tokenizer, usize::MAX, false)
    }

    /// Add a row; returns whether it made it into the context
    pub(crate) fn push(&mut self, id: impl Into<String>, row: String) -> bool {
        let cost = self.tokenizer.count(&row) + 1;
        let fits = !self.full
            && self
                .header_tokens
                .saturating_add(self.row_tokens)
                .saturating_add(cost)
                <= self.budget;

        if fits {
            self.row_tokens += cost;
        } else {
            self.full = true;
            if !self.keep_candidates {
                return false;
            }
        }

        self.block.records.push(ContextRecord {
            id: id.into(),
            row,
            in_context: fits,
        });
        fits
    }

    /// Whether all `rows` would fit together
    pub(crate) fn fits<'r>(&self, rows: impl IntoIterator<Item = &'r str>) -> bool {
        let cost: usize = rows
            .into_iter()
            .map(|row| self.tokenizer.count(row) + 1)
            .sum();
        !self.full
            && self
                .header_tokens
                .saturating_add(self.row_tokens)
                .saturating_add(cost)
                <= self.budget
    }

    /// Whether a row has been rejected
    pub(crate) fn is_full(&self) -> bool {
        self.full
    }

    /// Estimated tokens of the included rows plus headers, 0 when empty
    pub(crate) fn tokens(&self) -> usize {
        if self.row_tokens == 0 {
            0
        } else {
            self.header_tokens + self.row_tokens
        }
    }

    pub(crate) fn finish(self) -> (ContextBlock, usize) {
        let tokens = self.tokens();
        (self.block, tokens)
    }
}
