//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the answering pipeline with
//! standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all FinChat metrics
pub const METRICS_PREFIX: &str = "finchat";

/// Histogram buckets for a full turn and for model calls (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Turn metrics
    describe_counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        Unit::Count,
        "Answered turns by path"
    );

    describe_histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end turn latency in seconds"
    );

    describe_counter!(
        format!("{}_pipeline_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Turns that ended in the error fallback"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_variants_total", METRICS_PREFIX),
        Unit::Count,
        "Query variants searched, by outcome"
    );

    describe_gauge!(
        format!("{}_ranked_passages_count", METRICS_PREFIX),
        Unit::Count,
        "Passages kept after ranking"
    );

    // Model metrics
    describe_counter!(
        format!("{}_model_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Chat model calls by call site and status"
    );

    describe_histogram!(
        format!("{}_model_call_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat model call latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Record a completed turn
pub fn record_answer(duration_secs: f64, path: &str) {
    counter!(
        format!("{}_answers_total", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_answer_duration_seconds", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

/// Record a turn that fell back to the error sentence
pub fn record_pipeline_error(error_code: &str) {
    counter!(
        format!("{}_pipeline_errors_total", METRICS_PREFIX),
        "error_code" => error_code.to_string()
    )
    .increment(1);
}

/// Record the outcome of one query variant
pub fn record_retrieval_variant(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_retrieval_variants_total", METRICS_PREFIX),
        "status" => status
    )
    .increment(1);
}

/// Record how many passages survived ranking
pub fn record_ranked(count: usize) {
    gauge!(format!("{}_ranked_passages_count", METRICS_PREFIX)).set(count as f64);
}

/// Record one chat model call. `site` is `decision` or `generation`.
pub fn record_model_call(duration_secs: f64, site: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_calls_total", METRICS_PREFIX),
        "site" => site.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_model_call_duration_seconds", METRICS_PREFIX),
        "site" => site.to_string()
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(batch_size as u64);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        // Model calls time out at 60s by default
        assert_eq!(LATENCY_BUCKETS.last(), Some(&60.0));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops
        register_metrics();
        record_answer(0.2, "retrieval");
        record_pipeline_error("generation_error");
        record_retrieval_variant(false);
        record_ranked(3);
        record_model_call(0.1, "decision", true);
        record_embedding(0.05, "hashing-char-bigram", 1, true);
    }
}
