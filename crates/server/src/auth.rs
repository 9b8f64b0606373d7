//! API key authentication middleware, checked on every request except
//! the configured public paths (health, readiness, metrics).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::RwLock;
use policyrag_config::Settings;

static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

enum AuthCheck {
    Disabled,
    PublicPath,
    ConfigError(&'static str),
    CheckKey(String),
}

fn check_auth_config(config: &Arc<RwLock<Settings>>, path: &str) -> AuthCheck {
    let config_guard = config.read();
    let auth_config = &config_guard.server.auth;

    if !auth_config.enabled {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("API authentication is disabled; set server.auth.enabled for production");
        }
        return AuthCheck::Disabled;
    }

    if auth_config.public_paths.iter().any(|p| path.starts_with(p.as_str())) {
        return AuthCheck::PublicPath;
    }

    match &auth_config.api_key {
        Some(key) if !key.is_empty() => AuthCheck::CheckKey(key.clone()),
        _ => AuthCheck::ConfigError("auth is enabled but no API key is configured"),
    }
}

/// Checks `Authorization: Bearer <api_key>` against the configured key.
/// Bypasses the check entirely for public paths or when auth is disabled.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let config = match request.extensions().get::<Arc<RwLock<Settings>>>() {
        Some(cfg) => cfg.clone(),
        None => {
            tracing::error!("config extension missing from request");
            return (StatusCode::INTERNAL_SERVER_ERROR, "server configuration error").into_response();
        }
    };

    let path = request.uri().path().to_string();
    match check_auth_config(&config, &path) {
        AuthCheck::Disabled | AuthCheck::PublicPath => next.run(request).await,
        AuthCheck::ConfigError(msg) => {
            tracing::error!("{}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "server authentication not configured").into_response()
        }
        AuthCheck::CheckKey(expected_key) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            match auth_header {
                Some(header) if header.starts_with("Bearer ") => {
                    let provided_key = &header[7..];
                    if constant_time_compare(provided_key.as_bytes(), expected_key.as_bytes()) {
                        next.run(request).await
                    } else {
                        tracing::warn!("invalid API key rejected");
                        (StatusCode::UNAUTHORIZED, "invalid API key").into_response()
                    }
                }
                Some(_) => (StatusCode::BAD_REQUEST, "expected Authorization: Bearer <token>").into_response(),
                None => (StatusCode::UNAUTHORIZED, "missing Authorization header").into_response(),
            }
        }
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_keys_only() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }
}
