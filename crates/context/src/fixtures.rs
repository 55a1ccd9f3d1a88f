//! Shared test corpora

use crate::builder::LocalContextBuilder;
use graphsearch_common::knowledge::{CommunityReport, Entity, Relationship, TextUnit};
use graphsearch_common::llm::mock::MockEmbedder;
use graphsearch_common::tokenizer::ApproxTokenizer;
use graphsearch_common::vector_store::{InMemoryVectorStore, VectorRecord};
use graphsearch_common::{Embedder, KnowledgeBase, VectorStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

pub(crate) fn entity(id: &str, name: &str, rank: f64) -> Entity {
    Entity {
        id: id.to_string(),
        short_id: None,
        name: name.to_string(),
        entity_type: "PERSON".to_string(),
        description: format!("{} description", name),
        rank,
        description_embedding: None,
        text_unit_ids: vec![],
        community_ids: vec![],
    }
}

pub(crate) fn relationship(id: &str, source: &str, target: &str, weight: f64) -> Relationship {
    Relationship {
        id: id.to_string(),
        short_id: None,
        source: source.to_string(),
        target: target.to_string(),
        description: String::new(),
        weight,
        rank: None,
    }
}

fn text_unit(id: &str, text: &str, relationship_ids: &[&str]) -> TextUnit {
    TextUnit {
        id: id.to_string(),
        short_id: None,
        text: text.to_string(),
        entity_ids: vec![],
        relationship_ids: relationship_ids.iter().map(|s| s.to_string()).collect(),
        n_tokens: None,
    }
}

fn report(id: &str, community: &str, title: &str, summary: &str, rank: f64, members: &[&str]) -> CommunityReport {
    CommunityReport {
        id: id.to_string(),
        short_id: None,
        community_id: community.to_string(),
        level: 1,
        title: title.to_string(),
        summary: summary.to_string(),
        full_content: Some(format!("{}. Full report.", summary)),
        rank,
        entity_ids: members.iter().map(|s| s.to_string()).collect(),
    }
}

/// A (rank 0.9), B (0.5) and C (0.1); A and B are related
pub(crate) fn abc_knowledge_base() -> KnowledgeBase {
    let mut a = entity("ea", "A", 0.9);
    a.short_id = Some("1".into());
    a.description = "A is the first entity".into();
    a.text_unit_ids = vec!["t1".into(), "t2".into()];

    let mut b = entity("eb", "B", 0.5);
    b.short_id = Some("2".into());
    b.description = "B is the second entity".into();
    b.text_unit_ids = vec!["t2".into()];

    let mut c = entity("ec", "C", 0.1);
    c.short_id = Some("3".into());
    c.description = "C is the third entity".into();
    c.text_unit_ids = vec!["t3".into()];
    c.community_ids = vec!["cc".into()];

    let mut ab = relationship("r1", "ea", "eb", 1.0);
    ab.description = "A knows B".into();

    KnowledgeBase::new(
        vec![a, b, c],
        vec![ab],
        vec![
            report("c-ab", "ab", "Community AB", "A and B work together", 8.0, &["ea", "eb"]),
            report("c-c", "cc", "Community C", "C stands alone", 2.0, &[]),
        ],
        vec![
            text_unit("t1", "A was born in a small village near the river Arno.", &[]),
            text_unit("t2", "A met B in Florence.", &["r1"]),
            text_unit("t3", "C lived alone in the mountains.", &[]),
        ],
    )
    .unwrap()
}

/// "hub" related to a, b and c with rising weights; a also related to x
pub(crate) fn star_knowledge_base() -> KnowledgeBase {
    KnowledgeBase::new(
        vec![
            entity("hub", "HUB", 5.0),
            entity("a", "A", 3.0),
            entity("b", "B", 2.0),
            entity("c", "C", 1.0),
            entity("x", "X", 1.0),
        ],
        vec![
            relationship("hub-a", "hub", "a", 1.0),
            relationship("hub-b", "hub", "b", 2.0),
            relationship("hub-c", "hub", "c", 3.0),
            relationship("a-x", "a", "x", 1.0),
        ],
        vec![],
        vec![],
    )
    .unwrap()
}

/// Unrelated entities named by their ids
pub(crate) fn knowledge_base_with_ranks(ranks: &[(&str, f64)]) -> KnowledgeBase {
    let entities = ranks
        .iter()
        .map(|(id, rank)| entity(id, id, *rank))
        .collect();
    KnowledgeBase::new(entities, vec![], vec![], vec![]).unwrap()
}

/// Embedder placing A, B and C on the three axes, with queries near them
pub(crate) fn abc_embedder() -> MockEmbedder {
    MockEmbedder::new(3)
        .with_vector("A is the first entity", vec![1.0, 0.0, 0.0])
        .with_vector("B is the second entity", vec![0.0, 1.0, 0.0])
        .with_vector("C is the third entity", vec![0.0, 0.0, 1.0])
        .with_vector("A", vec![1.0, 0.2, 0.1])
        .with_vector("B", vec![0.1, 1.0, 0.05])
        .with_vector("C", vec![0.05, 0.1, 1.0])
        .with_vector("tell me about A", vec![1.0, 0.2, 0.1])
}

/// Store holding every entity description, keyed by entity id
async fn store_descriptions(kb: &KnowledgeBase, embedder: &MockEmbedder) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    let mut records = Vec::new();
    for e in kb.entities() {
        records.push(VectorRecord {
            id: e.id.clone(),
            text: e.description.clone(),
            vector: embedder.embed(&e.description).await.unwrap(),
            attributes: serde_json::json!({ "title": e.name }),
        });
    }
    store.upsert(&records).await.unwrap();
    store
}

pub(crate) async fn indexed_store(kb: &KnowledgeBase) -> (InMemoryVectorStore, MockEmbedder) {
    let embedder = abc_embedder();
    let store = store_descriptions(kb, &embedder).await;
    (store, embedder)
}

/// Builder over `kb` with an approximate tokenizer
pub(crate) async fn builder_for(
    kb: KnowledgeBase,
    embedder: MockEmbedder,
) -> (LocalContextBuilder, Arc<MockEmbedder>) {
    let store = Arc::new(store_descriptions(&kb, &embedder).await);
    let embedder = Arc::new(embedder);
    let builder = LocalContextBuilder::new(
        Arc::new(kb),
        store,
        embedder.clone(),
        Arc::new(ApproxTokenizer),
    );
    (builder, embedder)
}

pub(crate) async fn abc_builder() -> (LocalContextBuilder, Arc<MockEmbedder>) {
    builder_for(abc_knowledge_base(), abc_embedder()).await
}

const WORDS: [&str; 8] = [
    "painter", "river", "city", "machine", "portrait", "workshop", "patron", "study",
];

fn sentence(rng: &mut StdRng, min: usize, max: usize) -> String {
    let len = rng.gen_range(min..max);
    (0..len)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Random corpus with `size` entities and proportional relationships,
/// reports and text units
pub(crate) fn random_knowledge_base(rng: &mut StdRng, size: usize) -> KnowledgeBase {
    let mut entities = Vec::with_capacity(size);
    for i in 0..size {
        let rank = rng.gen_range(0..20) as f64;
        let mut e = entity(&format!("e{}", i), &format!("ENTITY_{}", i), rank);
        e.description = sentence(rng, 3, 40);
        entities.push(e);
    }

    let mut relationships = Vec::new();
    if size > 1 {
        for i in 0..size * 2 {
            let source = rng.gen_range(0..size);
            let target = (source + rng.gen_range(1..size)) % size;
            let weight = rng.gen_range(1..10) as f64;
            let mut rel = relationship(
                &format!("r{}", i),
                &format!("e{}", source),
                &format!("e{}", target),
                weight,
            );
            rel.description = sentence(rng, 2, 20);
            relationships.push(rel);
        }
    }

    let mut text_units = Vec::with_capacity(size);
    for i in 0..size {
        let text = sentence(rng, 10, 120);
        let mut unit = text_unit(&format!("t{}", i), &text, &[]);
        for rel in &relationships {
            if rng.gen_bool(0.1) {
                unit.relationship_ids.push(rel.id.clone());
            }
        }
        text_units.push(unit);
    }

    for e in entities.iter_mut() {
        let count = rng.gen_range(0..4);
        for _ in 0..count {
            e.text_unit_ids.push(format!("t{}", rng.gen_range(0..size)));
        }
    }

    let mut reports = Vec::new();
    for i in 0..size.div_ceil(3) {
        let member_count = rng.gen_range(1..5);
        let members: Vec<String> = (0..member_count)
            .map(|_| format!("e{}", rng.gen_range(0..size)))
            .collect();
        let members: Vec<&str> = members.iter().map(String::as_str).collect();
        let summary = sentence(rng, 10, 60);
        let rank = rng.gen_range(0..10) as f64;
        reports.push(report(
            &format!("c{}", i),
            &i.to_string(),
            &format!("Community {}", i),
            &summary,
            rank,
            &members,
        ));
    }

    KnowledgeBase::new(entities, relationships, reports, text_units).unwrap()
}

pub(crate) fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random query over the corpus vocabulary
pub(crate) fn random_query(rng: &mut StdRng) -> String {
    sentence(rng, 1, 8)
}
