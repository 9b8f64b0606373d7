//! HTTP client satisfying `PolicyIndex` against an external hybrid
//! lexical+vector search service. Wire shape mirrors `HttpReranker`:
//! one JSON request, one JSON response, errors bridged into
//! `policyrag_core::Error::Index`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use policyrag_core::traits::{IndexFilter, PolicyIndex, SourceMetadata};
use policyrag_core::{Error, EntitySet, Result, SearchResult};

pub struct HttpPolicyIndex {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPolicyIndex {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
    applies_to_any: &'a EntitySet,
    use_semantic: bool,
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(serde::Deserialize)]
struct MetadataResponse {
    metadata: Option<SourceMetadataWire>,
}

#[derive(serde::Deserialize)]
struct SourceMetadataWire {
    title: String,
    reference_number: String,
    section: String,
    applies_to: EntitySet,
    date_updated: Option<DateTime<Utc>>,
}

#[async_trait]
impl PolicyIndex for HttpPolicyIndex {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &IndexFilter,
        use_semantic: bool,
    ) -> Result<Vec<SearchResult>> {
        let body = SearchRequest {
            query,
            top_k,
            applies_to_any: &filter.applies_to_any,
            use_semantic,
        };

        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Index(format!("policy index request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "policy index returned status {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("invalid policy index response: {}", e)))?;

        tracing::debug!(count = parsed.results.len(), "policy index search returned");
        Ok(parsed.results)
    }

    async fn metadata_by_source_file(&self, source_file: &str) -> Result<Option<SourceMetadata>> {
        let response = self
            .client
            .get(format!("{}/metadata", self.endpoint))
            .query(&[("source_file", source_file)])
            .send()
            .await
            .map_err(|e| Error::Index(format!("policy index metadata request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "policy index returned status {}",
                response.status()
            )));
        }

        let parsed: MetadataResponse = response
            .json()
            .await
            .map_err(|e| Error::Index(format!("invalid policy index metadata response: {}", e)))?;

        Ok(parsed.metadata.map(|m| SourceMetadata {
            title: m.title,
            reference_number: m.reference_number,
            section: m.section,
            applies_to: m.applies_to,
            date_updated: m.date_updated,
        }))
    }
}
