//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the QA pipeline stages
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all AcuKG metrics
pub const METRICS_PREFIX: &str = "acukg";

/// Histogram buckets for end-to-end QA latency (in seconds).
/// Two LLM round trips dominate, so the range is wide.
pub const QA_LATENCY_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    20.00, // 20s
    30.00, // 30s
    60.00, // 60s
];

/// Buckets for graph query latency
pub const GRAPH_QUERY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    5.000, // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // QA pipeline metrics
    describe_counter!(
        format!("{}_qa_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions answered, by query type and mode"
    );

    describe_histogram!(
        format!("{}_qa_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end QA latency in seconds"
    );

    describe_counter!(
        format!("{}_intent_parse_total", METRICS_PREFIX),
        Unit::Count,
        "Intent parse outcomes (llm, fallback_rule, fallback_unknown)"
    );

    describe_counter!(
        format!("{}_entities_unmatched_total", METRICS_PREFIX),
        Unit::Count,
        "Entity mentions that matched no vocabulary name"
    );

    describe_histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph query latency in seconds"
    );

    describe_gauge!(
        format!("{}_graph_records_count", METRICS_PREFIX),
        Unit::Count,
        "Number of records returned by the last graph query"
    );

    describe_counter!(
        format!("{}_graph_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Graph query failures"
    );

    // Generation metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total text generation requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Text generation latency in seconds"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total vocabulary cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total vocabulary cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one answered question
pub fn record_question(duration_secs: f64, query_type: &str, use_kg: bool) {
    let mode = if use_kg { "graph" } else { "llm_only" };

    counter!(
        format!("{}_qa_questions_total", METRICS_PREFIX),
        "query_type" => query_type.to_string(),
        "mode" => mode
    )
    .increment(1);

    histogram!(
        format!("{}_qa_duration_seconds", METRICS_PREFIX),
        "mode" => mode
    )
    .record(duration_secs);
}

/// Record how an intent was obtained
pub fn record_intent_parse(outcome: &'static str) {
    counter!(
        format!("{}_intent_parse_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record mentions that stayed unmatched after normalization
pub fn record_unmatched(category: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_entities_unmatched_total", METRICS_PREFIX),
        "category" => category
    )
    .increment(count as u64);
}

/// Helper to record graph query metrics; `None` marks a failed query
pub fn record_graph_query(duration_secs: f64, query_type: &str, record_count: Option<usize>) {
    histogram!(
        format!("{}_graph_query_duration_seconds", METRICS_PREFIX),
        "query_type" => query_type.to_string()
    )
    .record(duration_secs);

    match record_count {
        Some(record_count) => {
            gauge!(
                format!("{}_graph_records_count", METRICS_PREFIX),
                "query_type" => query_type.to_string()
            )
            .set(record_count as f64);
        }
        None => {
            counter!(
                format!("{}_graph_errors_total", METRICS_PREFIX),
                "query_type" => query_type.to_string()
            )
            .increment(1);
        }
    }
}

/// Helper to record generation metrics
pub fn record_llm(duration_secs: f64, model: &str, purpose: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "purpose" => purpose,
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_llm_duration_seconds", METRICS_PREFIX),
            "purpose" => purpose
        )
        .record(duration_secs);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [QA_LATENCY_BUCKETS, GRAPH_QUERY_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper must be a no-op
        let metrics = RequestMetrics::start("POST", "/api/qa");
        metrics.finish(200);
        record_question(1.2, "disease_to_plans", true);
        record_intent_parse("llm");
        record_unmatched("combo", 0);
        record_unmatched("combo", 2);
        record_graph_query(0.01, "combo_to_points", Some(3));
        record_graph_query(0.01, "combo_to_points", None);
        record_llm(0.5, "qwen3-max", "parse", true);
        record_cache(false, "vocabulary");
    }
}
