//! Community report selection and the report block

use super::table::{self, BlockBuilder};
use super::{ContextBlock, ContextCategory};
use graphsearch_common::config::LocalContextParams;
use graphsearch_common::knowledge::{CommunityReport, Entity};
use graphsearch_common::{KnowledgeBase, Tokenizer};
use std::collections::HashSet;

/// Reports sharing members with the selected entities, most matches first.
///
/// An entity belongs to a report when the report lists it, or when the
/// entity lists the report's community. Ties fall back to report rank,
/// then load order.
pub(crate) fn select_reports<'kb>(
    kb: &'kb KnowledgeBase,
    selected: &[&Entity],
    params: &LocalContextParams,
) -> Vec<&'kb CommunityReport> {
    let selected_ids: HashSet<&str> = selected.iter().map(|e| e.id.as_str()).collect();

    let mut scored: Vec<(usize, &CommunityReport)> = kb
        .reports()
        .iter()
        .filter(|r| r.rank >= params.min_community_rank)
        .filter_map(|report| {
            let listed: HashSet<&str> = report
                .entity_ids
                .iter()
                .map(String::as_str)
                .filter(|id| selected_ids.contains(id))
                .collect();
            let matches = selected
                .iter()
                .filter(|e| {
                    listed.contains(e.id.as_str())
                        || e.community_ids.contains(&report.community_id)
                })
                .count();
            (matches > 0).then_some((matches, report))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.rank.total_cmp(&a.1.rank)));
    scored.into_iter().map(|(_, report)| report).collect()
}

pub(crate) fn report_header(params: &LocalContextParams) -> String {
    let mut columns = vec!["id", "title", "content"];
    if params.include_community_rank {
        columns.push("rank");
    }
    table::header(&columns, &params.column_delimiter)
}

fn report_row(report: &CommunityReport, params: &LocalContextParams) -> String {
    let mut cells = vec![
        report.display_id().to_string(),
        report.title.clone(),
        report.content(params.use_community_summary).to_string(),
    ];
    if params.include_community_rank {
        cells.push(report.rank.to_string());
    }
    table::row(&cells, &params.column_delimiter)
}

/// Report block filled greedily within `budget`
pub(crate) fn build_report_block(
    kb: &KnowledgeBase,
    selected: &[&Entity],
    params: &LocalContextParams,
    tokenizer: &dyn Tokenizer,
    budget: usize,
) -> (ContextBlock, usize) {
    let mut builder = BlockBuilder::new(
        ContextCategory::Reports,
        report_header(params),
        tokenizer,
        budget,
        params.return_candidate_context,
    );
    for report in select_reports(kb, selected, params) {
        builder.push(report.id.clone(), report_row(report, params));
        if builder.is_full() && !params.return_candidate_context {
            break;
        }
    }
    builder.finish()
}
