//! Knowledge base read model
//!
//! Provides:
//! - Entity, relationship, community report and text unit records
//! - Immutable, index-backed lookups shared across concurrent requests
//! - Table loading from the graph indexer output

mod loader;
mod models;

pub use loader::KnowledgeBaseLoader;
pub use models::{CommunityReport, Entity, Relationship, TextUnit};

use crate::errors::{AppError, Result};
use std::collections::HashMap;
use tracing::info;

/// Query-time view over the indexed graph.
///
/// Records keep their load order; every ordered traversal in the crate
/// breaks ties by that order.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    entities: Vec<Entity>,
    entity_index: HashMap<String, usize>,
    title_index: HashMap<String, usize>,

    relationships: Vec<Relationship>,
    relationship_index: HashMap<String, usize>,
    incident: HashMap<String, Vec<usize>>,

    reports: Vec<CommunityReport>,
    report_index: HashMap<String, usize>,

    text_units: Vec<TextUnit>,
    text_unit_index: HashMap<String, usize>,
}

fn index_by_id<T>(
    records: &[T],
    kind: &str,
    id: impl Fn(&T) -> &str,
) -> Result<HashMap<String, usize>> {
    let mut index = HashMap::with_capacity(records.len());
    for (pos, record) in records.iter().enumerate() {
        if index.insert(id(record).to_string(), pos).is_some() {
            return Err(AppError::integrity(format!(
                "duplicate {} id '{}'",
                kind,
                id(record)
            )));
        }
    }
    Ok(index)
}

impl KnowledgeBase {
    /// Build the read model, validating ids and relationship endpoints
    pub fn new(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        reports: Vec<CommunityReport>,
        text_units: Vec<TextUnit>,
    ) -> Result<Self> {
        let entity_index = index_by_id(&entities, "entity", |e| e.id.as_str())?;
        let relationship_index = index_by_id(&relationships, "relationship", |r| r.id.as_str())?;
        let report_index = index_by_id(&reports, "community report", |r| r.id.as_str())?;
        let text_unit_index = index_by_id(&text_units, "text unit", |t| t.id.as_str())?;

        let mut title_index = HashMap::with_capacity(entities.len());
        for (pos, entity) in entities.iter().enumerate() {
            title_index.entry(entity.name.clone()).or_insert(pos);
        }

        let mut incident: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, rel) in relationships.iter().enumerate() {
            for endpoint in [&rel.source, &rel.target] {
                if !entity_index.contains_key(endpoint.as_str()) {
                    return Err(AppError::integrity(format!(
                        "relationship '{}' references unknown entity '{}'",
                        rel.id, endpoint
                    )));
                }
            }
            incident.entry(rel.source.clone()).or_default().push(pos);
            if rel.target != rel.source {
                incident.entry(rel.target.clone()).or_default().push(pos);
            }
        }

        info!(
            entities = entities.len(),
            relationships = relationships.len(),
            reports = reports.len(),
            text_units = text_units.len(),
            "Knowledge base ready"
        );

        Ok(Self {
            entities,
            entity_index,
            title_index,
            relationships,
            relationship_index,
            incident,
            reports,
            report_index,
            text_units,
            text_unit_index,
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entity_index.get(id).map(|&pos| &self.entities[pos])
    }

    /// Load-order position of an entity
    pub fn entity_position(&self, id: &str) -> Option<usize> {
        self.entity_index.get(id).copied()
    }

    /// First entity with the given title
    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        self.title_index.get(name).map(|&pos| &self.entities[pos])
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn relationship(&self, id: &str) -> Option<&Relationship> {
        self.relationship_index
            .get(id)
            .map(|&pos| &self.relationships[pos])
    }

    /// Load-order positions of relationships touching an entity
    pub fn incident_relationships(&self, entity_id: &str) -> &[usize] {
        self.incident
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reports(&self) -> &[CommunityReport] {
        &self.reports
    }

    pub fn report(&self, id: &str) -> Option<&CommunityReport> {
        self.report_index.get(id).map(|&pos| &self.reports[pos])
    }

    pub fn text_units(&self) -> &[TextUnit] {
        &self.text_units
    }

    pub fn text_unit(&self, id: &str) -> Option<&TextUnit> {
        self.text_unit_index.get(id).map(|&pos| &self.text_units[pos])
    }

    /// Entity rank, 0 for unknown ids
    pub fn entity_rank(&self, id: &str) -> f64 {
        self.entity(id).map(|e| e.rank).unwrap_or(0.0)
    }

    /// Relationship rank, defaulting to the sum of its endpoint ranks
    pub fn relationship_rank(&self, rel: &Relationship) -> f64 {
        rel.rank
            .unwrap_or_else(|| self.entity_rank(&rel.source) + self.entity_rank(&rel.target))
    }
}
