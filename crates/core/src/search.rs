//! Hybrid search contract — the boundary to the semantic+keyword index.
//!
//! The index itself (embedding generation, fusion scoring, reranking) is an
//! external collaborator; the pipeline only consumes ordered, truncated
//! results through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::error::SearchError;

/// One search result, best-first ordered by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,

    /// Fused semantic+keyword relevance in a backend-defined range
    pub score: f32,

    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// The retrieval collaborator contract.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Search a collection. Results arrive best-first and already truncated
    /// to `limit`.
    async fn hybrid_search(
        &self,
        query: &str,
        collection: &str,
        limit: usize,
        filters: Option<&serde_json::Map<String, Value>>,
    ) -> std::result::Result<Vec<SearchHit>, SearchError>;
}
