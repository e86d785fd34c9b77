//! ENRICH stage — pull narrative context from the hybrid search index.
//!
//! Runs after the evidence is judged sufficient (or progression is forced)
//! and before generation. Every lookup is failure-tolerant: a dead index
//! just means an empty context section, never a failed turn.

use gridline_core::search::SearchBackend;
use gridline_core::state::{PipelineState, QueryKind, Understanding};
use tracing::{debug, warn};

/// One retrieved context passage, ready for prompt formatting.
#[derive(Debug, Clone)]
pub struct ContextDoc {
    pub label: String,
    pub content: String,
    pub relevance: f32,
}

/// Context gathered for the generation prompt.
#[derive(Debug, Clone, Default)]
pub struct EnrichedContext {
    pub race_context: Vec<ContextDoc>,
    pub community: Vec<ContextDoc>,
    pub regulations: Vec<ContextDoc>,
    pub past_analyses: Vec<ContextDoc>,
}

impl EnrichedContext {
    pub fn total_docs(&self) -> usize {
        self.race_context.len()
            + self.community.len()
            + self.regulations.len()
            + self.past_analyses.len()
    }
}

pub async fn run(state: &PipelineState, search: &dyn SearchBackend) -> EnrichedContext {
    let understanding = state.understanding.clone().unwrap_or_default();
    let query = build_search_query(&understanding, state.current_query());

    let mut context = EnrichedContext::default();

    context.race_context = fetch(search, &query, "race_reports", 3, 500, "source").await;
    context.community = fetch(search, &query, "community_threads", 3, 400, "score").await;

    if needs_regulations(&understanding) {
        let reg_query = if understanding.query_type == QueryKind::Incident {
            format!("penalty rules {query}")
        } else {
            query.clone()
        };
        context.regulations = fetch(search, &reg_query, "regulations", 2, 400, "article").await;
    }

    context.past_analyses = fetch(search, &query, "past_analyses", 2, 300, "query").await;

    debug!(docs = context.total_docs(), "Context enrichment complete");
    context
}

async fn fetch(
    search: &dyn SearchBackend,
    query: &str,
    collection: &str,
    limit: usize,
    truncate: usize,
    label_key: &str,
) -> Vec<ContextDoc> {
    match search.hybrid_search(query, collection, limit, None).await {
        Ok(hits) => hits
            .into_iter()
            .map(|hit| ContextDoc {
                label: hit
                    .metadata
                    .get(label_key)
                    .map(|v| v.to_string().trim_matches('"').to_string())
                    .unwrap_or_else(|| collection.to_string()),
                content: hit.content.chars().take(truncate).collect(),
                relevance: hit.score,
            })
            .collect(),
        Err(e) => {
            warn!(collection, error = %e, "Context search failed, continuing without");
            Vec::new()
        }
    }
}

/// Assemble the search query from extracted entities, query-type keywords,
/// and the original question.
fn build_search_query(understanding: &Understanding, original_query: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !understanding.drivers.is_empty() {
        parts.push(understanding.drivers.join(" "));
    }
    if !understanding.teams.is_empty() {
        parts.push(understanding.teams.join(" "));
    }
    if !understanding.events.is_empty() {
        parts.push(understanding.events.join(" "));
    }

    let type_context = match understanding.query_type {
        QueryKind::Comparison => "comparison battle performance",
        QueryKind::Strategy => "strategy pit stop undercut overcut",
        QueryKind::Pace => "pace lap times speed",
        QueryKind::Telemetry => "telemetry speed throttle brake",
        QueryKind::Incident => "incident crash penalty investigation",
        QueryKind::Prediction => "prediction forecast expectation",
        QueryKind::Historical => "historical record statistics",
        QueryKind::Results => "results classification standings",
        QueryKind::General => "",
    };
    if !type_context.is_empty() {
        parts.push(type_context.into());
    }

    if !original_query.is_empty() {
        parts.push(original_query.into());
    }

    parts.join(" ")
}

/// Regulations only matter for incidents, strategy calls, and questions
/// whose sub-questions use rules vocabulary.
fn needs_regulations(understanding: &Understanding) -> bool {
    if matches!(
        understanding.query_type,
        QueryKind::Incident | QueryKind::Strategy
    ) {
        return true;
    }
    const KEYWORDS: [&str; 6] = ["penalty", "rule", "regulation", "legal", "illegal", "steward"];
    understanding.sub_questions.iter().any(|q| {
        let q = q.to_lowercase();
        KEYWORDS.iter().any(|kw| q.contains(kw))
    })
}
