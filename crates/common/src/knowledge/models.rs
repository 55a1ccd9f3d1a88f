//! Knowledge base records produced by the graph indexing pipeline

use serde::{Deserialize, Serialize};

/// A named concept extracted from source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    /// Human-readable id used in rendered context tables
    #[serde(default)]
    pub short_id: Option<String>,

    #[serde(alias = "title")]
    pub name: String,

    #[serde(rename = "type", default)]
    pub entity_type: String,

    #[serde(default)]
    pub description: String,

    /// Importance score (typically the node degree)
    #[serde(default)]
    pub rank: f64,

    #[serde(default)]
    pub description_embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub text_unit_ids: Vec<String>,

    #[serde(default)]
    pub community_ids: Vec<String>,
}

/// A weighted link between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,

    #[serde(default)]
    pub short_id: Option<String>,

    /// Source entity id
    pub source: String,

    /// Target entity id
    pub target: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_weight")]
    pub weight: f64,

    #[serde(default)]
    pub rank: Option<f64>,
}

fn default_weight() -> f64 {
    1.0
}

/// Generated summary of a cluster of entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReport {
    pub id: String,

    #[serde(default)]
    pub short_id: Option<String>,

    pub community_id: String,

    pub level: u32,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub full_content: Option<String>,

    #[serde(default)]
    pub rank: f64,

    /// Member entity ids
    #[serde(default)]
    pub entity_ids: Vec<String>,
}

/// A fragment of original source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,

    #[serde(default)]
    pub short_id: Option<String>,

    pub text: String,

    #[serde(default)]
    pub entity_ids: Vec<String>,

    #[serde(default)]
    pub relationship_ids: Vec<String>,

    #[serde(default)]
    pub n_tokens: Option<usize>,
}

impl Entity {
    /// Id shown in rendered tables
    pub fn display_id(&self) -> &str {
        self.short_id.as_deref().unwrap_or(&self.id)
    }
}

impl Relationship {
    pub fn display_id(&self) -> &str {
        self.short_id.as_deref().unwrap_or(&self.id)
    }

    /// Whether `entity_id` is one of the endpoints
    pub fn touches(&self, entity_id: &str) -> bool {
        self.source == entity_id || self.target == entity_id
    }
}

impl CommunityReport {
    pub fn display_id(&self) -> &str {
        self.short_id.as_deref().unwrap_or(&self.id)
    }

    /// Summary or full content, falling back to the summary when no full text exists
    pub fn content(&self, use_summary: bool) -> &str {
        match (&self.full_content, use_summary) {
            (Some(full), false) => full,
            _ => &self.summary,
        }
    }
}

impl TextUnit {
    pub fn display_id(&self) -> &str {
        self.short_id.as_deref().unwrap_or(&self.id)
    }
}
