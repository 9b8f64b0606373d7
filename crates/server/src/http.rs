//! HTTP Endpoints
//!
//! REST API for the policy RAG chat core: chat, streaming chat, cache
//! admin, audit admin, health.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Json, Query as QueryParams, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use futures::stream::Stream;
use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use policyrag_core::{EntitySet, Query};

use crate::auth::auth_middleware;
use crate::metrics::metrics_handler;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    let config = state.config.read();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", get(chat_stream))
        .route("/admin/cache/invalidate-all", post(invalidate_all))
        .route("/admin/cache/invalidate-responses", post(invalidate_responses))
        .route("/admin/cache/invalidate-search", post(invalidate_search))
        .route("/admin/cache/stats", get(cache_stats))
        .route("/admin/audit/records", get(audit_records))
        .route("/admin/audit/stats", get(audit_stats))
        .route("/admin/reload-config", post(reload_config))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(auth_middleware))
        .layer(axum::middleware::from_fn_with_state(state.rate_limiter.clone(), rate_limit_middleware))
        .layer(Extension(state.config.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Builds a CORS layer from configured origins.
///
/// - If `cors_enabled` is false, returns a permissive layer (dev only).
/// - If `cors_origins` is empty, defaults to `localhost:3000` for safety.
/// - Otherwise uses the configured origins.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!(count = parsed_origins.len(), "CORS configured with explicit origins");
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    entities: Vec<String>,
}

fn build_query(question: String, entities: Vec<String>) -> Query {
    let filter: EntitySet = entities.into_iter().collect();
    Query::new(question).with_filter(filter)
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<policyrag_core::Response> {
    let query = build_query(request.question, request.entities);
    let response = state.orchestrator.handle(query).await;
    crate::metrics::record_request("/api/chat", 200);
    Json(response)
}

#[derive(Debug, Deserialize)]
struct ChatStreamParams {
    question: String,
    #[serde(default)]
    entities: Vec<String>,
}

async fn chat_stream(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<ChatStreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel(32);
    let query = build_query(params.question, params.entities);

    tokio::spawn(async move {
        state.orchestrator.handle_streaming(query, tx).await;
    });

    let stream = tokio_stream::wrappers::ReceiverStream::new(rx).map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[derive(Debug, Serialize)]
struct StatusMessage {
    status: &'static str,
    message: String,
}

async fn invalidate_all(State(state): State<AppState>) -> Json<StatusMessage> {
    state.orchestrator.cache.invalidate_all();
    Json(StatusMessage { status: "ok", message: "all caches invalidated".to_string() })
}

async fn invalidate_responses(State(state): State<AppState>) -> Json<StatusMessage> {
    state.orchestrator.cache.invalidate_responses();
    Json(StatusMessage { status: "ok", message: "response cache invalidated".to_string() })
}

async fn invalidate_search(State(state): State<AppState>) -> Json<StatusMessage> {
    state.orchestrator.cache.invalidate_search();
    Json(StatusMessage { status: "ok", message: "search cache invalidated".to_string() })
}

async fn cache_stats(State(state): State<AppState>) -> Json<policyrag_rag::CacheStats> {
    Json(state.orchestrator.cache.stats())
}

#[derive(Debug, Deserialize)]
struct AuditDateParam {
    date: Option<String>,
    limit: Option<i32>,
}

fn today_partition() -> String {
    chrono::Utc::now().format("%Y/%m/%d").to_string()
}

async fn audit_records(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<AuditDateParam>,
) -> Result<Json<Vec<policyrag_core::traits::AuditRecord>>, StatusCode> {
    let Some(audit) = &state.audit else { return Err(StatusCode::NOT_FOUND) };
    let date = params.date.unwrap_or_else(today_partition);
    let limit = params.limit.unwrap_or(100);
    audit
        .records_for_date(&date, limit)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to load audit records");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

async fn audit_stats(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<AuditDateParam>,
) -> Result<Json<policyrag_persistence::AuditStats>, StatusCode> {
    let Some(audit) = &state.audit else { return Err(StatusCode::NOT_FOUND) };
    let date = params.date.unwrap_or_else(today_partition);
    audit.stats_for_date(&date).await.map(Json).map_err(|e| {
        tracing::error!(error = %e, "failed to compute audit stats");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_config() {
        Ok(()) => (StatusCode::OK, Json(StatusMessage { status: "ok", message: "configuration reloaded".to_string() })),
        Err(e) => {
            tracing::error!(error = %e, "config reload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(StatusMessage { status: "error", message: e }))
        }
    }
}

async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") })))
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let stats = state.orchestrator.cache.stats();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ready",
            "cache": {
                "expansion_hit_rate": stats.expansion.hit_rate(),
                "response_hit_rate": stats.response.hit_rate(),
                "search_hit_rate": stats.search.hit_rate(),
            }
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cors_layer_falls_back_to_localhost_when_enabled_with_no_origins() {
        let _ = build_cors_layer(&[], true);
    }

    #[test]
    fn build_query_collects_entities_into_filter() {
        let query = build_query("what is policy 214".to_string(), vec!["adult".to_string(), "adult".to_string()]);
        assert_eq!(query.entity_filter.len(), 1);
    }

    #[allow(dead_code)]
    fn assert_router_compiles(state: AppState) -> Router {
        let _ = Arc::new(state.clone());
        create_router(state)
    }
}
