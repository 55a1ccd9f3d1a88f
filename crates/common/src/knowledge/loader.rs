//! Table loading from the graph indexer output directory
//!
//! Each table is a JSON array of row objects stored as `<table>.json`.

use super::{CommunityReport, Entity, KnowledgeBase, Relationship, TextUnit};
use crate::config::KnowledgeBaseConfig;
use crate::errors::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Row of the node table: one per entity, level and community
#[derive(Debug, Deserialize)]
struct NodeRow {
    #[serde(flatten)]
    entity: Entity,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    community: Option<serde_json::Value>,
}

/// Row of the entity description embedding table
#[derive(Debug, Deserialize)]
struct EntityEmbeddingRow {
    id: String,
    description_embedding: Option<Vec<f32>>,
}

/// Reads the five indexer tables and assembles a [`KnowledgeBase`]
pub struct KnowledgeBaseLoader {
    config: KnowledgeBaseConfig,
}

impl KnowledgeBaseLoader {
    pub fn new(config: KnowledgeBaseConfig) -> Self {
        Self { config }
    }

    /// Override the artifacts directory from the configuration
    pub fn with_artifacts_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.artifacts_dir = dir.into();
        self
    }

    fn table_path(&self, table: &str) -> PathBuf {
        Path::new(&self.config.artifacts_dir).join(format!("{}.json", table))
    }

    async fn read_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        let path = self.table_path(table);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AppError::config(format!(
                "required table '{}' unreadable at {}: {}",
                table,
                path.display(),
                e
            ))
        })?;

        let rows: Vec<T> = serde_json::from_str(&raw).map_err(|e| {
            AppError::config(format!("table '{}' is malformed: {}", table, e))
        })?;

        debug!(table, rows = rows.len(), "Table loaded");
        Ok(rows)
    }

    async fn read_optional_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>> {
        if tokio::fs::try_exists(self.table_path(table)).await? {
            self.read_table(table).await
        } else {
            warn!(table, "Optional table missing, continuing without it");
            Ok(Vec::new())
        }
    }

    /// Load all tables and build the read model
    #[instrument(skip(self), fields(dir = %self.config.artifacts_dir))]
    pub async fn load(&self) -> Result<KnowledgeBase> {
        let nodes: Vec<NodeRow> = self.read_table(&self.config.entity_table).await?;
        let embeddings: Vec<EntityEmbeddingRow> = self
            .read_optional_table(&self.config.entity_embedding_table)
            .await?;
        let relationships: Vec<Relationship> =
            self.read_table(&self.config.relationship_table).await?;
        let reports: Vec<CommunityReport> =
            self.read_table(&self.config.community_report_table).await?;
        let text_units: Vec<TextUnit> = self.read_table(&self.config.text_unit_table).await?;

        let mut entities = collect_entities(nodes, self.config.max_community_level);
        attach_embeddings(&mut entities, embeddings);
        let reports = filter_reports(reports, self.config.max_community_level);

        info!(
            entities = entities.len(),
            reports = reports.len(),
            max_level = self.config.max_community_level,
            "Indexer tables loaded"
        );

        KnowledgeBase::new(entities, relationships, reports, text_units)
    }
}

/// Fold node rows into one entity per id, in first-seen order.
///
/// Rows above `max_level` are dropped; the communities of the remaining
/// rows become the entity's `community_ids`.
fn collect_entities(rows: Vec<NodeRow>, max_level: u32) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        if row.level.is_some_and(|level| level > max_level) {
            continue;
        }
        let community = row.community.and_then(community_id);
        let slot = match index.get(&row.entity.id) {
            Some(&slot) => slot,
            None => {
                index.insert(row.entity.id.clone(), entities.len());
                entities.push(row.entity);
                entities.len() - 1
            }
        };
        let entity = &mut entities[slot];
        if let Some(community) = community {
            if !entity.community_ids.contains(&community) {
                entity.community_ids.push(community);
            }
        }
    }
    entities
}

/// Community ids arrive as strings or integers depending on the indexer version
fn community_id(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Join description embeddings onto entities by id; existing vectors win
fn attach_embeddings(entities: &mut [Entity], rows: Vec<EntityEmbeddingRow>) {
    let by_id: HashMap<String, Vec<f32>> = rows
        .into_iter()
        .filter_map(|row| row.description_embedding.map(|v| (row.id, v)))
        .collect();

    for entity in entities.iter_mut() {
        if entity.description_embedding.is_none() {
            entity.description_embedding = by_id.get(&entity.id).cloned();
        }
    }
}

/// Keep reports at or below the configured hierarchy level
fn filter_reports(reports: Vec<CommunityReport>, max_level: u32) -> Vec<CommunityReport> {
    reports
        .into_iter()
        .filter(|r| r.level <= max_level)
        .collect()
}
