//! Three-tier cache layer: expansion (LRU, no TTL), response
//! (LRU + TTL, insert-gated by `should_cache`), search (LRU + TTL).
//!
//! Every family is thread-safe and keeps its own hit/miss counters.
//! `invalidate_all`/`invalidate_responses`/`invalidate_search` clear the
//! indicated family and bump a shared, monotonically increasing version
//! counter; nothing reads that counter back today, but it lets a future
//! caller detect "my cached handle predates the last flush" without
//! re-querying every family.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use policyrag_core::{ExpandedQuery, Response, SearchResult};

#[derive(Debug, Clone, Default, Serialize)]
pub struct FamilyStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl FamilyStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub expansion: FamilyStats,
    pub response: FamilyStats,
    pub search: FamilyStats,
}

struct Inner<V> {
    map: HashMap<String, (V, Instant)>,
    order: VecDeque<String>,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }
}

struct FamilyCache<V: Clone> {
    capacity: usize,
    ttl: Option<Duration>,
    inner: Mutex<Inner<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> FamilyCache<V> {
    fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.map.get(key) {
            Some((_, inserted_at)) => self.ttl.map(|ttl| inserted_at.elapsed() > ttl).unwrap_or(false),
            None => false,
        };
        if expired {
            inner.map.remove(key);
            inner.order.retain(|k| k != key);
        }
        let found = inner.map.get(key).map(|(v, _)| v.clone());
        if found.is_some() {
            inner.order.retain(|k| k != key);
            inner.order.push_back(key.to_string());
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn set(&self, key: String, value: V) {
        let mut inner = self.inner.lock();
        inner.order.retain(|k| k != &key);
        inner.order.push_back(key.clone());
        inner.map.insert(key, (value, Instant::now()));

        while inner.map.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    fn stats(&self) -> FamilyStats {
        let inner = self.inner.lock();
        FamilyStats {
            size: inner.map.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// The three cache families the orchestrator reads and writes through.
pub struct PolicyCache {
    expansion: FamilyCache<ExpandedQuery>,
    response: FamilyCache<Response>,
    search: FamilyCache<Vec<SearchResult>>,
    version: AtomicU64,
}

impl PolicyCache {
    pub fn new(
        expansion_size: usize,
        response_size: usize,
        search_size: usize,
        response_ttl: Duration,
        search_ttl: Duration,
    ) -> Self {
        Self {
            expansion: FamilyCache::new(expansion_size, None),
            response: FamilyCache::new(response_size, Some(response_ttl)),
            search: FamilyCache::new(search_size, Some(search_ttl)),
            version: AtomicU64::new(0),
        }
    }

    pub fn get_expansion(&self, canonical_key: &str) -> Option<ExpandedQuery> {
        self.expansion.get(canonical_key)
    }

    pub fn set_expansion(&self, canonical_key: &str, expanded: ExpandedQuery) {
        self.expansion.set(canonical_key.to_string(), expanded);
    }

    pub fn get_response(&self, key: &str) -> Option<Response> {
        self.response.get(key)
    }

    /// Insert only if `response.should_cache()` holds.
    pub fn set_response(&self, key: &str, response: &Response) {
        if response.should_cache() {
            self.response.set(key.to_string(), response.clone());
        }
    }

    pub fn get_search(&self, key: &str) -> Option<Vec<SearchResult>> {
        self.search.get(key)
    }

    pub fn set_search(&self, key: &str, results: Vec<SearchResult>) {
        self.search.set(key.to_string(), results);
    }

    pub fn invalidate_all(&self) {
        self.expansion.clear();
        self.response.clear();
        self.search.clear();
        self.version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidate_responses(&self) {
        self.response.clear();
        self.version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidate_search(&self) {
        self.search.clear();
        self.version.fetch_add(1, Ordering::Relaxed);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            expansion: self.expansion.stats(),
            response: self.response.stats(),
            search: self.search.stats(),
        }
    }
}

/// Builds a hash cache key from canonicalized/expanded query text plus an
/// entity filter expression.
pub fn hash_key(parts: &[&str]) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
        0u8.hash(&mut hasher); // separator, avoids "ab"+"c" == "a"+"bc" collisions
    }
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::ExpansionRule::Abbreviation;
    use policyrag_core::{Clarification, ConfidenceLevel, ExpandedTerm};

    fn sample_expanded() -> ExpandedQuery {
        ExpandedQuery {
            original: "npo".into(),
            canonical_key: "npo".into(),
            expanded: "npo nothing by mouth".into(),
            fired_rules: vec![ExpandedTerm {
                term: "nothing by mouth".into(),
                rule: Abbreviation,
            }],
            truncated: false,
        }
    }

    #[test]
    fn expansion_cache_round_trips() {
        let cache = PolicyCache::new(2, 2, 2, Duration::from_secs(60), Duration::from_secs(60));
        cache.set_expansion("npo", sample_expanded());
        assert!(cache.get_expansion("npo").is_some());
        assert!(cache.get_expansion("missing").is_none());
        let stats = cache.stats();
        assert_eq!(stats.expansion.hits, 1);
        assert_eq!(stats.expansion.misses, 1);
    }

    #[test]
    fn response_cache_rejects_uncacheable_response() {
        let cache = PolicyCache::new(2, 2, 2, Duration::from_secs(60), Duration::from_secs(60));
        let clarification = Response {
            clarification: Some(Clarification {
                message: "which device?".into(),
                options: vec!["A".into(), "B".into()],
            }),
            confidence: ConfidenceLevel::ClarificationNeeded,
            ..Response::not_found("n/a", "AMBIGUOUS_TERM")
        };
        cache.set_response("key", &clarification);
        assert!(cache.get_response("key").is_none());
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = PolicyCache::new(2, 2, 2, Duration::from_secs(60), Duration::from_secs(60));
        cache.set_expansion("a", sample_expanded());
        cache.set_expansion("b", sample_expanded());
        cache.set_expansion("c", sample_expanded());
        assert!(cache.get_expansion("a").is_none());
        assert!(cache.get_expansion("c").is_some());
    }

    #[test]
    fn invalidate_all_bumps_version_and_clears() {
        let cache = PolicyCache::new(2, 2, 2, Duration::from_secs(60), Duration::from_secs(60));
        cache.set_expansion("a", sample_expanded());
        let v0 = cache.version();
        cache.invalidate_all();
        assert!(cache.get_expansion("a").is_none());
        assert!(cache.version() > v0);
    }

    #[test]
    fn hash_key_is_deterministic() {
        assert_eq!(hash_key(&["a", "b"]), hash_key(&["a", "b"]));
        assert_ne!(hash_key(&["a", "b"]), hash_key(&["ab"]));
    }
}
