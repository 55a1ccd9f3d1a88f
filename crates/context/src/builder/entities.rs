//! Query-to-entity mapping and the entity block

use super::table::{self, BlockBuilder};
use super::ContextCategory;
use graphsearch_common::config::{EntityKey, LocalContextParams};
use graphsearch_common::knowledge::Entity;
use graphsearch_common::{AppError, Embedder, KnowledgeBase, Result, Tokenizer, VectorStore};
use std::collections::HashSet;
use tracing::{debug, warn};

fn resolve<'kb>(kb: &'kb KnowledgeBase, key: EntityKey, value: &str) -> Option<&'kb Entity> {
    match key {
        EntityKey::Id => kb.entity(value),
        EntityKey::Title => kb.entity_by_name(value),
    }
}

/// Map the query onto knowledge base entities via description similarity.
///
/// Explicitly included entities come first, followed by up to
/// `top_k_mapped_entities` nearest matches. An empty query matches nothing
/// and makes no embedding call.
pub(crate) async fn map_query_to_entities<'kb>(
    query: &str,
    kb: &'kb KnowledgeBase,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    params: &LocalContextParams,
) -> Result<Vec<&'kb Entity>> {
    let excluded: HashSet<&str> = params
        .exclude_entity_names
        .iter()
        .map(String::as_str)
        .collect();

    let mut matched: Vec<&Entity> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for name in &params.include_entity_names {
        match kb.entity_by_name(name) {
            Some(entity) if seen.insert(entity.id.as_str()) => matched.push(entity),
            Some(_) => {}
            None => warn!(entity = %name, "Included entity not in knowledge base"),
        }
    }

    if query.trim().is_empty() {
        debug!("Empty query, skipping entity mapping");
        return Ok(matched);
    }

    let k = params
        .top_k_mapped_entities
        .saturating_mul(params.oversample_scaler);
    let hits = store.similarity_search_by_text(query, embedder, k).await?;

    let mut similar = 0;
    for hit in &hits {
        if similar >= params.top_k_mapped_entities {
            break;
        }
        let entity = resolve(kb, params.embedding_vectorstore_key, &hit.record.id).ok_or_else(
            || AppError::UnknownEntity {
                id: hit.record.id.clone(),
            },
        )?;
        if excluded.contains(entity.name.as_str()) || !seen.insert(entity.id.as_str()) {
            continue;
        }
        matched.push(entity);
        similar += 1;
    }

    debug!(hits = hits.len(), matched = matched.len(), "Query mapped to entities");
    Ok(matched)
}

/// Order entities by rank, highest first; ties keep knowledge base order
pub(crate) fn order_by_rank(kb: &KnowledgeBase, entities: &mut [&Entity]) {
    entities.sort_by(|a, b| {
        b.rank.total_cmp(&a.rank).then_with(|| {
            kb.entity_position(&a.id)
                .cmp(&kb.entity_position(&b.id))
        })
    });
}

pub(crate) fn entity_header(params: &LocalContextParams) -> String {
    let mut columns = vec!["id", "entity", "description"];
    if params.include_entity_rank {
        columns.push(params.rank_description.as_str());
    }
    table::header(&columns, &params.column_delimiter)
}

pub(crate) fn entity_row(entity: &Entity, params: &LocalContextParams) -> String {
    let mut cells = vec![
        entity.display_id().to_string(),
        entity.name.clone(),
        entity.description.clone(),
    ];
    if params.include_entity_rank {
        cells.push(entity.rank.to_string());
    }
    table::row(&cells, &params.column_delimiter)
}

/// Entity block for exactly `entities`, in the given order
pub(crate) fn entity_block<'t>(
    entities: &[&Entity],
    params: &LocalContextParams,
    tokenizer: &'t dyn Tokenizer,
) -> BlockBuilder<'t> {
    let mut builder =
        BlockBuilder::unbounded(ContextCategory::Entities, entity_header(params), tokenizer);
    for entity in entities {
        builder.push(entity.id.clone(), entity_row(entity, params));
    }
    builder
}
