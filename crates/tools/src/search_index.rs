//! Static hybrid-search index — stub for the semantic+keyword backend.
//!
//! In production this fronts a vector database with fusion scoring and
//! reranking. The stub holds a small fixed corpus per collection and scores
//! by keyword overlap, which is enough to exercise enrichment end-to-end.

use async_trait::async_trait;
use gridline_core::error::SearchError;
use gridline_core::search::{SearchBackend, SearchHit};
use serde_json::{json, Value};

/// The collections the enrichment stage queries.
pub const COLLECTIONS: [&str; 4] = [
    "race_reports",
    "community_threads",
    "regulations",
    "past_analyses",
];

pub struct StaticSearchIndex;

impl StaticSearchIndex {
    pub fn new() -> Self {
        Self
    }

    fn corpus(collection: &str) -> Option<Vec<(&'static str, Value)>> {
        match collection {
            "race_reports" => Some(vec![
                (
                    "VER controlled the race from the front at Monza, managing medium tire degradation through the middle stint while NOR closed within two seconds in the final laps.",
                    json!({"source": "race_report", "event": "Monza", "season": 2025}),
                ),
                (
                    "A late safety car bunched the field at Spa; LEC lost track position after pitting one lap before the neutralization.",
                    json!({"source": "race_report", "event": "Spa", "season": 2025}),
                ),
                (
                    "Qualifying at Suzuka came down to sector 1 speed, with the top three covered by less than a tenth.",
                    json!({"source": "race_report", "event": "Suzuka", "season": 2025}),
                ),
            ]),
            "community_threads" => Some(vec![
                (
                    "The undercut was clearly the winning move this weekend, track position was worth more than tire delta.",
                    json!({"score": 812}),
                ),
                (
                    "NOR's long-run pace in practice suggested he had the fastest race car, the result came down to the start.",
                    json!({"score": 455}),
                ),
            ]),
            "regulations" => Some(vec![
                (
                    "Cars must not be driven unnecessarily slowly, erratically, or in a manner deemed potentially dangerous to other drivers.",
                    json!({"article": "33.4"}),
                ),
                (
                    "A ten-second time penalty is applied when a driver causes a collision and predominant fault is established.",
                    json!({"article": "54.3"}),
                ),
            ]),
            "past_analyses" => Some(vec![
                (
                    "Earlier comparison of VER and NOR at Monza found a 0.2s average pace advantage built mostly in the first sector.",
                    json!({"query": "compare VER and NOR at Monza"}),
                ),
            ]),
            _ => None,
        }
    }
}

impl Default for StaticSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for StaticSearchIndex {
    fn name(&self) -> &str {
        "static_index"
    }

    async fn hybrid_search(
        &self,
        query: &str,
        collection: &str,
        limit: usize,
        _filters: Option<&serde_json::Map<String, Value>>,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let corpus = Self::corpus(collection)
            .ok_or_else(|| SearchError::UnknownCollection(collection.into()))?;

        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(String::from)
            .collect();

        let mut hits: Vec<SearchHit> = corpus
            .into_iter()
            .map(|(content, metadata)| {
                let lower = content.to_lowercase();
                let matched = terms.iter().filter(|t| lower.contains(t.as_str())).count();
                let score = if terms.is_empty() {
                    0.0
                } else {
                    matched as f32 / terms.len() as f32
                };
                SearchHit {
                    content: content.to_string(),
                    score,
                    metadata: metadata.as_object().cloned().unwrap_or_default(),
                }
            })
            .filter(|h| h.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_orders_best_first_and_truncates() {
        let index = StaticSearchIndex::new();
        let hits = index
            .hybrid_search("VER NOR Monza pace", "race_reports", 2, None)
            .await
            .unwrap();
        assert!(hits.len() <= 2);
        assert!(!hits.is_empty());
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn unknown_collection_errors() {
        let index = StaticSearchIndex::new();
        let err = index
            .hybrid_search("anything", "telemetry_blobs", 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownCollection(_)));
    }

    #[tokio::test]
    async fn unrelated_query_returns_empty() {
        let index = StaticSearchIndex::new();
        let hits = index
            .hybrid_search("zzzz qqqq", "regulations", 3, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
