//! GraphSearch one-shot runner
//!
//! Loads the indexed knowledge graph, indexes entity descriptions into the
//! embedding store, answers one question and proposes follow-up questions.

use anyhow::Context;
use clap::Parser;
use graphsearch_common::config::AppConfig;
use graphsearch_common::knowledge::KnowledgeBaseLoader;
use graphsearch_common::llm::OpenAIClient;
use graphsearch_common::tokenizer::TiktokenTokenizer;
use graphsearch_common::{metrics, vector_store, Embedder, VERSION};
use graphsearch_context::{EntityIndexer, LocalContextBuilder, LocalQuestionGen, LocalSearch};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "graphsearch", version, about = "Local search over an indexed knowledge graph")]
struct Args {
    /// Configuration file, layered over config/ and the environment
    #[arg(long, env = "GRAPHSEARCH_CONFIG")]
    config: Option<String>,

    /// Directory holding the indexer output tables
    #[arg(long)]
    artifacts: Option<String>,

    /// Question to answer
    #[arg(long, default_value = "Tell me about Leonardo Da Vinci")]
    query: String,

    /// Previous user questions, oldest first; repeat for each one
    #[arg(
        long = "history",
        default_values_t = [
            "Tell me about Leonardo Da Vinci".to_string(),
            "Leonardo's early works".to_string(),
        ]
    )]
    history: Vec<String>,

    /// Follow-up questions to propose (defaults to questions.count)
    #[arg(long)]
    questions: Option<usize>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    if config.llm.api_key.is_none() {
        config.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
    }
    if let Some(dir) = &args.artifacts {
        config.knowledge_base.artifacts_dir = dir.clone();
    }

    init_tracing(&config);
    metrics::register_metrics();
    info!(
        service = %config.observability.service_name,
        "Starting GraphSearch v{}", VERSION
    );

    // Model client first, so a missing key fails before any work
    let client = Arc::new(
        OpenAIClient::new(&config.llm, &config.embedding)
            .context("Failed to create language model client")?,
    );

    let kb = KnowledgeBaseLoader::new(config.knowledge_base.clone())
        .load()
        .await
        .context("Failed to load knowledge base")?;
    let kb = Arc::new(kb);

    info!(provider = ?config.vector_store.provider, "Connecting to vector store...");
    let store = vector_store::connect(&config.vector_store, client.dimension())
        .await
        .context("Failed to connect to vector store")?;

    let indexer = EntityIndexer::new(
        store.clone(),
        client.clone(),
        config.local_context.embedding_vectorstore_key,
        config.embedding.batch_size,
    );
    indexer
        .index(kb.entities())
        .await
        .context("Failed to index entity descriptions")?;

    let tokenizer = Arc::new(TiktokenTokenizer::cl100k()?);
    let builder = Arc::new(LocalContextBuilder::new(kb, store, client.clone(), tokenizer));

    let search = LocalSearch::new(
        client.clone(),
        builder.clone(),
        config.local_context.clone(),
        config.generation.clone(),
    );
    let result = search.search(&args.query, None).await.context("Search failed")?;
    println!("Search Result: {}", result.response);

    let generator = LocalQuestionGen::new(
        client,
        builder,
        config.local_context.clone(),
        config.generation.clone(),
    );
    let count = args.questions.unwrap_or(config.questions.count);
    let questions = generator
        .generate(&args.history, None, count)
        .await
        .context("Question generation failed")?;

    println!("Generated Questions:");
    for question in &questions.questions {
        println!("- {}", question);
    }

    info!(
        search_ms = result.completion_time.as_millis() as u64,
        questions_ms = questions.completion_time.as_millis() as u64,
        "Done"
    );
    Ok(())
}
