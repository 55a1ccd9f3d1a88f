//! Metrics and observability utilities
//!
//! Records through the `metrics` facade with standardized naming. No
//! exporter is installed here; a host process that wants the numbers
//! installs its own recorder before calling into the pipeline.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all GraphSearch metrics
pub const METRICS_PREFIX: &str = "graphsearch";

/// Register all metric descriptions
pub fn register_metrics() {
    // Model metrics
    describe_counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat and embedding calls"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Model call latency in seconds, including retries"
    );

    describe_counter!(
        format!("{}_model_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Retries scheduled after transient model failures"
    );

    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of local search queries"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Local search latency in seconds"
    );

    // Context metrics
    describe_histogram!(
        format!("{}_context_tokens", METRICS_PREFIX),
        Unit::Count,
        "Tokens placed in the context window per evidence category"
    );

    // Question generation
    describe_counter!(
        format!("{}_questions_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Follow-up questions returned"
    );

    // Vector store
    describe_histogram!(
        format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Vector store query latency in seconds"
    );

    tracing::debug!("Metrics registered");
}

/// Helper to record one chat or embedding call
pub fn record_model_call(operation: &str, model: &str, duration_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Helper to record a scheduled retry
pub fn record_model_retry(operation: &str) {
    counter!(
        format!("{}_model_retries_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, grounded: bool) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "grounded" => grounded.to_string()
    )
    .increment(1);

    histogram!(format!("{}_search_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record context usage for one evidence category
pub fn record_context_tokens(category: &str, tokens: usize) {
    histogram!(
        format!("{}_context_tokens", METRICS_PREFIX),
        "category" => category.to_string()
    )
    .record(tokens as f64);
}

/// Helper to record question generation
pub fn record_question_generation(returned: usize) {
    counter!(format!("{}_questions_generated_total", METRICS_PREFIX)).increment(returned as u64);
}

/// Helper to record a vector store query
pub fn record_vector_query(store: &str, duration_secs: f64) {
    histogram!(
        format!("{}_vector_query_duration_seconds", METRICS_PREFIX),
        "store" => store.to_string()
    )
    .record(duration_secs);
}
