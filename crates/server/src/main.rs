//! Policy RAG Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use policyrag_config::{load_settings, Settings};
use policyrag_llm::{OllamaBackend, OllamaConfig, OpenAIBackend, OpenAIConfig, PromptGenerator};
use policyrag_orchestrator::Orchestrator;
use policyrag_rag::{HttpPolicyIndex, HttpReranker};
use policyrag_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("POLICY_RAG_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration from files (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(e) => {
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting policy RAG server");
    tracing::info!(environment = ?config.environment, config_path = env.as_deref().unwrap_or("default"), "configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let audit = if config.persistence.enabled {
        tracing::info!("initializing ScyllaDB audit log...");
        match init_persistence(&config).await {
            Ok(log) => {
                tracing::info!(
                    hosts = ?config.persistence.scylla_hosts,
                    keyspace = %config.persistence.keyspace,
                    "ScyllaDB audit log initialized"
                );
                Some(Arc::new(log))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to initialize ScyllaDB, continuing without an audit log");
                None
            }
        }
    } else {
        tracing::info!("persistence disabled, audit records are not stored");
        None
    };

    let index = Arc::new(HttpPolicyIndex::new(config.retrieval.policy_index_url.clone()));
    let reranker = Arc::new(HttpReranker::new(config.rerank.reranker_url.clone()));
    let generator = Arc::new(PromptGenerator::new(build_llm_backend(&config)?));

    let mut orchestrator = Orchestrator::new(index, reranker, generator);
    if let Some(audit) = &audit {
        orchestrator = orchestrator.with_audit(audit.clone());
    }
    orchestrator.top_k = config.retrieval.top_k;

    let state = AppState::new(config.clone(), Arc::new(orchestrator), audit, metrics_handle, env);

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn build_llm_backend(config: &Settings) -> Result<Arc<dyn policyrag_llm::LlmBackend>, Box<dyn std::error::Error>> {
    let url = &config.generation.generator_url;
    if url.contains("openai.com") {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let backend = OpenAIBackend::new(OpenAIConfig::openai(api_key, config.generation.model_name.clone()))?;
        Ok(Arc::new(backend))
    } else if url.contains("11434") {
        let backend = OllamaBackend::new(OllamaConfig { model: config.generation.model_name.clone(), endpoint: url.clone(), ..Default::default() })?;
        Ok(Arc::new(backend))
    } else {
        let backend = OpenAIBackend::new(OpenAIConfig::local(url.clone(), config.generation.model_name.clone()))?;
        Ok(Arc::new(backend))
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("policyrag={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        if config.observability.tracing_enabled {
            match opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(otlp_endpoint))
                .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(opentelemetry_sdk::Resource::new(vec![
                    opentelemetry::KeyValue::new("service.name", "policyrag-server"),
                    opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ])))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
            {
                Ok(tracer) => {
                    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                    subscriber.with(fmt_layer).with(otel_layer).init();
                    tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                    return;
                }
                Err(e) => eprintln!("failed to initialize OpenTelemetry: {e}. Falling back."),
            }
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("policyrag={},tower_http=debug", config.observability.log_level).into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn init_persistence(config: &Settings) -> Result<policyrag_persistence::ScyllaAuditLog, policyrag_persistence::PersistenceError> {
    let scylla_config = policyrag_persistence::ScyllaConfig {
        hosts: config.persistence.scylla_hosts.clone(),
        keyspace: config.persistence.keyspace.clone(),
        replication_factor: config.persistence.replication_factor,
    };
    policyrag_persistence::init(scylla_config).await
}
