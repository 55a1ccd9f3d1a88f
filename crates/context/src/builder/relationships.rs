//! Relationship selection and the relationship block

use super::table::{self, BlockBuilder};
use super::ContextCategory;
use graphsearch_common::config::{LocalContextParams, RelationshipRanking};
use graphsearch_common::knowledge::{Entity, Relationship};
use graphsearch_common::{KnowledgeBase, Tokenizer};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A relationship chosen for the context, with its link count
#[derive(Debug, Clone, Copy)]
pub(crate) struct SelectedRelationship<'kb> {
    pub(crate) relationship: &'kb Relationship,
    position: usize,
    pub(crate) links: usize,
}

fn ranking_value(kb: &KnowledgeBase, rel: &Relationship, ranking: RelationshipRanking) -> f64 {
    match ranking {
        RelationshipRanking::Rank => kb.relationship_rank(rel),
        RelationshipRanking::Weight => rel.weight,
    }
}

fn by_ranking(
    kb: &KnowledgeBase,
    ranking: RelationshipRanking,
) -> impl Fn(&SelectedRelationship<'_>, &SelectedRelationship<'_>) -> Ordering + '_ {
    move |a: &SelectedRelationship<'_>, b: &SelectedRelationship<'_>| {
        ranking_value(kb, b.relationship, ranking)
            .total_cmp(&ranking_value(kb, a.relationship, ranking))
            .then_with(|| b.relationship.weight.total_cmp(&a.relationship.weight))
            .then_with(|| a.position.cmp(&b.position))
    }
}

/// Relationships for the selected entities.
///
/// In-network relationships (both endpoints selected) come first. Then
/// out-network ones, preferring outside entities linked to more of the
/// selection, capped at `top_k_relationships` per selected entity.
pub(crate) fn select_relationships<'kb>(
    kb: &'kb KnowledgeBase,
    selected: &[&Entity],
    params: &LocalContextParams,
) -> Vec<SelectedRelationship<'kb>> {
    let selected_ids: HashSet<&str> = selected.iter().map(|e| e.id.as_str()).collect();

    // Load order, each relationship once
    let positions: BTreeSet<usize> = selected
        .iter()
        .flat_map(|e| kb.incident_relationships(&e.id).iter().copied())
        .collect();

    let mut in_network = Vec::new();
    let mut out_network = Vec::new();
    for position in positions {
        let rel = &kb.relationships()[position];
        let source_in = selected_ids.contains(rel.source.as_str());
        let target_in = selected_ids.contains(rel.target.as_str());
        let candidate = SelectedRelationship {
            relationship: rel,
            position,
            links: 0,
        };
        if source_in && target_in {
            in_network.push(SelectedRelationship { links: 2, ..candidate });
        } else {
            out_network.push(candidate);
        }
    }

    // Selected entities each outside entity connects to
    let mut outside_links: HashMap<&str, HashSet<&str>> = HashMap::new();
    for candidate in &out_network {
        let rel = candidate.relationship;
        let (inside, outside) = if selected_ids.contains(rel.source.as_str()) {
            (rel.source.as_str(), rel.target.as_str())
        } else {
            (rel.target.as_str(), rel.source.as_str())
        };
        outside_links.entry(outside).or_default().insert(inside);
    }
    for candidate in &mut out_network {
        let rel = candidate.relationship;
        let outside = if selected_ids.contains(rel.source.as_str()) {
            rel.target.as_str()
        } else {
            rel.source.as_str()
        };
        candidate.links = outside_links.get(outside).map_or(0, HashSet::len);
    }

    let ranking = params.relationship_ranking;
    in_network.sort_by(by_ranking(kb, ranking));

    let out_budget = params
        .top_k_relationships
        .saturating_mul(selected.len().max(1));
    let rank_order = by_ranking(kb, ranking);
    out_network.sort_by(|a, b| b.links.cmp(&a.links).then_with(|| rank_order(a, b)));
    out_network.truncate(out_budget);

    in_network.extend(out_network);
    in_network
}

pub(crate) fn relationship_header(params: &LocalContextParams) -> String {
    let mut columns = vec!["id", "source", "target", "description"];
    if params.include_relationship_weight {
        columns.push("weight");
    }
    columns.push("links");
    table::header(&columns, &params.column_delimiter)
}

pub(crate) fn relationship_row(
    kb: &KnowledgeBase,
    selected: &SelectedRelationship<'_>,
    params: &LocalContextParams,
) -> String {
    let rel = selected.relationship;
    let name = |id: &str| {
        kb.entity(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    let mut cells = vec![
        rel.display_id().to_string(),
        name(&rel.source),
        name(&rel.target),
        rel.description.clone(),
    ];
    if params.include_relationship_weight {
        cells.push(rel.weight.to_string());
    }
    cells.push(selected.links.to_string());
    table::row(&cells, &params.column_delimiter)
}

/// Relationship block for the relationships of exactly `selected`
pub(crate) fn relationship_block<'t>(
    kb: &KnowledgeBase,
    selected: &[&Entity],
    params: &LocalContextParams,
    tokenizer: &'t dyn Tokenizer,
) -> BlockBuilder<'t> {
    let mut builder = BlockBuilder::unbounded(
        ContextCategory::Relationships,
        relationship_header(params),
        tokenizer,
    );
    for rel in select_relationships(kb, selected, params) {
        builder.push(rel.relationship.id.clone(), relationship_row(kb, &rel, params));
    }
    builder
}
