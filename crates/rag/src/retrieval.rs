//! Retrieval Stage: calls the external policy index with expanded
//! text, entity filter, top-K, and a semantic-hybrid flag. The Search
//! cache wraps this stage — callers go through `retrieve` which checks
//! the cache before calling the index and populates it on miss.

use std::sync::Arc;

use policyrag_core::traits::{IndexFilter, PolicyIndex};
use policyrag_core::{EntitySet, Result, SearchResult};

use crate::cache::{hash_key, PolicyCache};

pub struct RetrievalStage {
    index: Arc<dyn PolicyIndex>,
    cache: Arc<PolicyCache>,
    top_k: usize,
}

impl RetrievalStage {
    pub fn new(index: Arc<dyn PolicyIndex>, cache: Arc<PolicyCache>, top_k: usize) -> Self {
        Self { index, cache, top_k }
    }

    pub async fn retrieve(
        &self,
        expanded_text: &str,
        entity_filter: &EntitySet,
    ) -> Result<Vec<SearchResult>> {
        let filter_key: Vec<&str> = entity_filter.iter().map(|s| s.as_str()).collect();
        let key = hash_key(&[expanded_text, &filter_key.join(","), &self.top_k.to_string()]);

        if let Some(cached) = self.cache.get_search(&key) {
            return Ok(cached);
        }

        let filter = IndexFilter::from_entities(entity_filter);
        let results = self
            .index
            .search(expanded_text, self.top_k, &filter, true)
            .await?;

        self.cache.set_search(&key, results.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policyrag_core::traits::SourceMetadata;
    use std::time::Duration;

    struct StubIndex {
        results: Vec<SearchResult>,
    }

    #[async_trait]
    impl PolicyIndex for StubIndex {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _filter: &IndexFilter,
            _use_semantic: bool,
        ) -> Result<Vec<SearchResult>> {
            Ok(self.results.clone())
        }

        async fn metadata_by_source_file(&self, _source_file: &str) -> Result<Option<SourceMetadata>> {
            Ok(None)
        }
    }

    fn sample_result() -> SearchResult {
        SearchResult {
            id: "c1".into(),
            content: "content".into(),
            title: "Policy".into(),
            reference_number: "100".into(),
            section: "1".into(),
            source_file: "f1".into(),
            page_number: Some(1),
            applies_to: EntitySet::new(),
            score: 0.8,
        }
    }

    #[tokio::test]
    async fn search_cache_hit_skips_index_call() {
        let index = Arc::new(StubIndex {
            results: vec![sample_result()],
        });
        let cache = Arc::new(PolicyCache::new(
            10,
            10,
            10,
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let stage = RetrievalStage::new(index, cache.clone(), 100);

        let first = stage.retrieve("npo policy", &EntitySet::new()).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(cache.stats().search.misses, 1);

        let second = stage.retrieve("npo policy", &EntitySet::new()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(cache.stats().search.hits, 1);
    }
}
