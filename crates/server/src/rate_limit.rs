//! Per-client token bucket rate limiting, applied as Axum middleware
//! ahead of auth so an unauthenticated flood is also capped.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limit exceeded")]
    Exceeded,
}

struct Bucket {
    tokens: AtomicI64,
    last_refill: parking_lot::Mutex<Instant>,
}

/// A shared token bucket limiter keyed by client IP. Buckets refill
/// continuously at `requests_per_second`, capped at
/// `requests_per_second * burst_multiplier`.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    requests_per_second: f64,
    capacity: f64,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32, burst_multiplier: f32) -> Self {
        Self {
            buckets: DashMap::new(),
            requests_per_second: requests_per_second as f64,
            capacity: requests_per_second as f64 * burst_multiplier as f64,
        }
    }

    /// Attempts to take one token for `key`. Returns `Err` when the
    /// bucket is empty.
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: AtomicI64::new((self.capacity * 1000.0) as i64),
            last_refill: parking_lot::Mutex::new(Instant::now()),
        });

        let mut last_refill = entry.last_refill.lock();
        let elapsed = last_refill.elapsed();
        if elapsed > Duration::from_millis(10) {
            let refill = (elapsed.as_secs_f64() * self.requests_per_second * 1000.0) as i64;
            let max = (self.capacity * 1000.0) as i64;
            let current = entry.tokens.load(Ordering::Relaxed);
            entry.tokens.store((current + refill).min(max), Ordering::Relaxed);
            *last_refill = Instant::now();
        }
        drop(last_refill);

        let current = entry.tokens.load(Ordering::Relaxed);
        if current < 1000 {
            return Err(RateLimitError::Exceeded);
        }
        entry.tokens.fetch_sub(1000, Ordering::Relaxed);
        Ok(())
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(&addr.ip().to_string()) {
        Ok(()) => next.run(request).await,
        Err(_) => (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills() {
        let limiter = RateLimiter::new(1, 1.0);
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-a").is_err());
        std::thread::sleep(Duration::from_millis(20));
        // still under a second, refill is proportional but tiny; the
        // bucket started full so the second request after draining
        // should still be rejected this soon.
        assert!(limiter.check("client-a").is_err());
    }

    #[test]
    fn separate_clients_have_separate_buckets() {
        let limiter = RateLimiter::new(1, 1.0);
        assert!(limiter.check("client-a").is_ok());
        assert!(limiter.check("client-b").is_ok());
    }
}
