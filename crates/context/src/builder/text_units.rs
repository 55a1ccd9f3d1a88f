//! Source text selection and the sources block

use super::table::{self, BlockBuilder};
use super::{ContextBlock, ContextCategory};
use graphsearch_common::config::LocalContextParams;
use graphsearch_common::knowledge::{Entity, TextUnit};
use graphsearch_common::{KnowledgeBase, Tokenizer};
use std::collections::HashSet;
use tracing::debug;

/// Text units of the selected entities.
///
/// Ordered by the position of the first selected entity citing the unit,
/// then by how many of that entity's relationships the unit supports.
pub(crate) fn select_text_units<'kb>(
    kb: &'kb KnowledgeBase,
    selected: &[&Entity],
) -> Vec<&'kb TextUnit> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut candidates: Vec<(usize, usize, &TextUnit)> = Vec::new();

    for (order, entity) in selected.iter().enumerate() {
        let entity_relationships: HashSet<&str> = kb
            .incident_relationships(&entity.id)
            .iter()
            .map(|&pos| kb.relationships()[pos].id.as_str())
            .collect();

        for unit_id in &entity.text_unit_ids {
            let Some(unit) = kb.text_unit(unit_id) else {
                debug!(entity = %entity.id, text_unit = %unit_id, "Referenced text unit not loaded");
                continue;
            };
            if !seen.insert(unit.id.as_str()) {
                continue;
            }
            let supported = unit
                .relationship_ids
                .iter()
                .filter(|id| entity_relationships.contains(id.as_str()))
                .count();
            candidates.push((order, supported, unit));
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    candidates.into_iter().map(|(_, _, unit)| unit).collect()
}

/// Sources block filled greedily within `budget`
pub(crate) fn build_text_unit_block(
    kb: &KnowledgeBase,
    selected: &[&Entity],
    params: &LocalContextParams,
    tokenizer: &dyn Tokenizer,
    budget: usize,
) -> (ContextBlock, usize) {
    let delimiter = params.column_delimiter.as_str();
    let mut builder = BlockBuilder::new(
        ContextCategory::Sources,
        table::header(&["id", "text"], delimiter),
        tokenizer,
        budget,
        params.return_candidate_context,
    );
    for unit in select_text_units(kb, selected) {
        let row = table::row(&[unit.display_id().to_string(), unit.text.clone()], delimiter);
        builder.push(unit.id.clone(), row);
        if builder.is_full() && !params.return_candidate_context {
            break;
        }
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use graphsearch_common::tokenizer::ApproxTokenizer;

    #[test]
    fn test_units_follow_entity_order() {
        let kb = fixtures::abc_knowledge_base();
        let a = kb.entity_by_name("A").unwrap();
        let c = kb.entity_by_name("C").unwrap();

        let ids: Vec<_> = select_text_units(&kb, &[c, a])
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, vec!["t3", "t2", "t1"]);
    }

    #[test]
    fn test_supported_relationships_break_ties() {
        let kb = fixtures::abc_knowledge_base();
        let a = kb.entity_by_name("A").unwrap();

        // t2 supports r1, t1 supports nothing
        let ids: Vec<_> = select_text_units(&kb, &[a])
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn test_shared_units_listed_once() {
        let kb = fixtures::abc_knowledge_base();
        let selected: Vec<&Entity> = kb.entities().iter().collect();
        let units = select_text_units(&kb, &selected);
        let unique: HashSet<_> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(unique.len(), units.len());
    }

    #[test]
    fn test_candidates_kept_when_requested() {
        let kb = fixtures::abc_knowledge_base();
        let a = kb.entity_by_name("A").unwrap();
        let params = LocalContextParams {
            return_candidate_context: true,
            ..Default::default()
        };

        let (block, _) = build_text_unit_block(&kb, &[a], &params, &ApproxTokenizer, 20);
        assert_eq!(block.records.len(), 2);
        assert!(block.records[0].in_context);
        assert!(!block.records[1].in_context);
    }
}
