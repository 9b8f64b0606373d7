//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use policyrag_config::{load_settings, Settings};
use policyrag_orchestrator::Orchestrator;
use policyrag_persistence::ScyllaAuditLog;

use crate::rate_limit::RateLimiter;

/// Application state shared across every handler.
#[derive(Clone)]
pub struct AppState {
    /// Configuration wrapped in RwLock for hot-reload support.
    pub config: Arc<RwLock<Settings>>,
    /// The orchestrator driving the retrieval-augmented chat pipeline.
    pub orchestrator: Arc<Orchestrator>,
    /// Audit log, present only when persistence is enabled.
    pub audit: Option<Arc<ScyllaAuditLog>>,
    /// Per-client rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Prometheus render handle for the `/metrics` endpoint.
    pub metrics_handle: PrometheusHandle,
    /// Environment name, used when reloading configuration from disk.
    env: Option<String>,
}

impl AppState {
    pub fn new(
        config: Settings,
        orchestrator: Arc<Orchestrator>,
        audit: Option<Arc<ScyllaAuditLog>>,
        metrics_handle: PrometheusHandle,
        env: Option<String>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            config.server.rate_limit.requests_per_second,
            config.server.rate_limit.burst_multiplier,
        ));
        Self {
            config: Arc::new(RwLock::new(config)),
            orchestrator,
            audit,
            rate_limiter,
            metrics_handle,
            env,
        }
    }

    /// Reloads configuration from disk and updates the shared state.
    pub fn reload_config(&self) -> Result<(), String> {
        let new_config = load_settings(self.env.as_deref()).map_err(|e| format!("failed to reload config: {e}"))?;
        let mut config = self.config.write();
        *config = new_config;
        tracing::info!("configuration reloaded successfully");
        Ok(())
    }

    /// Returns a read guard to the current configuration.
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
