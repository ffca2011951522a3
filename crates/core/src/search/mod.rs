//! Hybrid search request glue (§4.6).
//!
//! `StorageEngine::hybrid_search` takes an already-embedded query vector; this
//! module is the thin layer that turns a text query into one via an
//! [`EmbeddingProvider`] and carries the tunable defaults (`w_v = 0.7`,
//! `w_b = 0.3`, oversample `3k`) so callers don't have to restate them.

use crate::embedder::EmbeddingProvider;
use crate::error::IndexResult;
use crate::index::StorageEngine;
use crate::types::{SearchFilters, SearchResult};

/// A hybrid search query plus its tunables.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    pub k: usize,
    pub vector_weight: f64,
    pub bm25_weight: f64,
    pub oversample_factor: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, k: usize) -> Self {
        Self {
            query: query.into(),
            filters: SearchFilters::default(),
            k,
            vector_weight: 0.7,
            bm25_weight: 0.3,
            oversample_factor: 3,
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Embeds a query and runs it through the storage engine's hybrid search.
pub struct SearchEngine<'a> {
    storage: &'a StorageEngine,
    provider: &'a dyn EmbeddingProvider,
}

impl<'a> SearchEngine<'a> {
    pub fn new(storage: &'a StorageEngine, provider: &'a dyn EmbeddingProvider) -> Self {
        Self { storage, provider }
    }

    /// Run a hybrid search. Falls back to keyword-only ranking (empty query
    /// vector) when the embedding provider is unavailable.
    pub async fn search(&self, request: &SearchRequest) -> IndexResult<Vec<SearchResult>> {
        let query_vec = if self.provider.is_available() {
            self.provider
                .embed(std::slice::from_ref(&request.query))
                .await?
                .into_iter()
                .next()
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        self.storage.hybrid_search(
            &request.query,
            &query_vec,
            &request.filters,
            request.k,
            request.vector_weight,
            request.bm25_weight,
            request.oversample_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedder::DeterministicEmbeddingProvider;
    use crate::types::{Chunk, ChunkKind};

    fn sample_chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_path: "src/lib.rs".to_string(),
            language: "rust".to_string(),
            content: content.to_string(),
            chunk_kind: ChunkKind::Function,
            name: "parse_config".to_string(),
            parent_name: None,
            start_line: 1,
            end_line: 10,
            content_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn search_embeds_query_and_returns_hybrid_results() {
        let mut storage = StorageEngine::open_in_memory().expect("open");
        let config = EmbeddingConfig {
            provider: "deterministic".to_string(),
            ..Default::default()
        };
        let provider = DeterministicEmbeddingProvider::new(&config);

        let chunk = sample_chunk("c1", "fn parse_config(path: &str) -> Config { todo!() }");
        let embedding = provider
            .embed(&[chunk.content.clone()])
            .await
            .expect("embed")
            .remove(0);
        storage
            .upsert_chunks(&[chunk], &[("c1".to_string(), embedding)])
            .expect("upsert");

        let engine = SearchEngine::new(&storage, &provider);
        let request = SearchRequest::new("parse config", 5);
        let results = engine.search(&request).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c1");
    }

    #[test]
    fn default_weights_match_spec_defaults() {
        let request = SearchRequest::new("anything", 10);
        assert!((request.vector_weight - 0.7).abs() < f64::EPSILON);
        assert!((request.bm25_weight - 0.3).abs() < f64::EPSILON);
        assert_eq!(request.oversample_factor, 3);
    }
}
