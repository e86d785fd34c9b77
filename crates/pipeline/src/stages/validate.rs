//! VALIDATE stage — a non-blocking quality check on the generated answer.
//!
//! Short answers (usually degraded paths) are skipped outright. The verdict
//! comes from a fast-tier LLM call; when it cannot be parsed, or the call
//! fails, the answer passes by default. A failing verdict appends a short
//! limitations note to the answer rather than withholding it.

use gridline_core::message::Message;
use gridline_core::provider::Tier;
use gridline_core::state::PipelineState;
use gridline_providers::ProviderRouter;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::prompts;

/// Answers shorter than this skip validation.
const MIN_VALIDATED_LEN: usize = 100;
/// Issues quoted back to the user when validation fails.
const MAX_QUOTED_ISSUES: usize = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationVerdict {
    #[serde(default = "default_pass")]
    pub passes_validation: bool,
    #[serde(default = "default_score")]
    pub score: f32,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

fn default_pass() -> bool {
    true
}
fn default_score() -> f32 {
    0.7
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self {
            passes_validation: default_pass(),
            score: default_score(),
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

pub async fn run(state: &mut PipelineState, router: &ProviderRouter) {
    let Some(answer) = state.answer.clone() else {
        return;
    };

    if answer.text.len() < MIN_VALIDATED_LEN {
        debug!(chars = answer.text.len(), "Skipping validation for short answer");
        return;
    }

    let understanding = state.understanding.clone().unwrap_or_default();
    let completeness = state
        .analysis
        .as_ref()
        .map(|a| a.completeness_score)
        .unwrap_or(0.0);
    let user_query = state.current_query().to_string();

    let messages = vec![
        Message::system(prompts::VALIDATE_SYSTEM),
        Message::user(prompts::validate_prompt(
            &user_query,
            &understanding.sub_questions,
            &answer.text,
            completeness,
        )),
    ];

    let verdict = match router.generate(&messages, Tier::Fast).await {
        Ok(text) => parse_verdict(&text),
        Err(e) => {
            // Validation must never block the answer
            warn!(error = %e, "Validation call failed, passing answer through");
            ValidationVerdict::default()
        }
    };

    info!(
        passes = verdict.passes_validation,
        score = verdict.score,
        issues = verdict.issues.len(),
        "Answer validated"
    );

    if !verdict.passes_validation && !verdict.issues.is_empty() {
        let note = verdict
            .issues
            .iter()
            .take(MAX_QUOTED_ISSUES)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        if let Some(answer) = &mut state.answer {
            answer.text.push_str(&format!("\n\n*Note: {note}*"));
        }
    }
}

/// Parse the verdict JSON out of the response; default to pass on any
/// parse failure.
fn parse_verdict(response: &str) -> ValidationVerdict {
    let extracted = prompts::extract_json(response);
    let candidate = match (extracted.find('{'), extracted.rfind('}')) {
        (Some(start), Some(end)) if end > start => &extracted[start..=end],
        _ => extracted,
    };
    match serde_json::from_str::<ValidationVerdict>(candidate) {
        Ok(mut verdict) => {
            verdict.score = verdict.score.clamp(0.0, 1.0);
            verdict
        }
        Err(e) => {
            warn!(error = %e, "Could not parse validation verdict, passing by default");
            ValidationVerdict::default()
        }
    }
}
