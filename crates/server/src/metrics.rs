//! Prometheus metrics: request counts, latency histograms by pipeline
//! stage, and cache hit rates, scraped at `/metrics`.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global Prometheus recorder and returns the handle used
/// to render `/metrics` output.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_request(route: &str, status: u16) {
    metrics::counter!("policyrag_requests_total", "route" => route.to_string(), "status" => status.to_string()).increment(1);
}

pub fn record_error(stage: &str) {
    metrics::counter!("policyrag_errors_total", "stage" => stage.to_string()).increment(1);
}

pub fn record_pipeline_latency(stage: &str, millis: u64) {
    metrics::histogram!("policyrag_stage_latency_ms", "stage" => stage.to_string()).record(millis as f64);
}

pub fn record_total_latency(millis: u64, is_multi_policy: bool) {
    metrics::histogram!("policyrag_total_latency_ms", "multi_policy" => is_multi_policy.to_string()).record(millis as f64);
}

pub fn record_cache_hit(family: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("policyrag_cache_lookups_total", "family" => family.to_string(), "outcome" => outcome).increment(1);
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> impl IntoResponse {
    state.metrics_handle.render()
}
