//! UNDERSTAND stage — extract structured intent from the user message.
//!
//! This stage can degrade but never abort: an unparseable response yields a
//! conservative general/full-race understanding at low confidence, and a
//! provider failure yields the same at even lower confidence, so the turn
//! always proceeds to planning.

use gridline_core::message::{Message, Role};
use gridline_core::provider::Tier;
use gridline_core::state::{PipelineState, Understanding};
use gridline_providers::ProviderRouter;
use tracing::{info, warn};

use crate::prompts;

/// Confidence assigned when the LLM output could not be parsed.
const PARSE_FALLBACK_CONFIDENCE: f32 = 0.3;
/// Confidence assigned when no provider produced output at all.
const PROVIDER_FALLBACK_CONFIDENCE: f32 = 0.1;

pub async fn run(state: &mut PipelineState, router: &ProviderRouter) {
    let user_message = state.current_query().to_string();
    let history = format_history(&state.messages, 5);

    let messages = vec![
        Message::system(prompts::UNDERSTAND_SYSTEM),
        Message::user(prompts::understand_prompt(&user_message, &history)),
    ];

    let understanding = match router.generate(&messages, Tier::Fast).await {
        Ok(text) => match serde_json::from_str::<Understanding>(prompts::extract_json(&text)) {
            Ok(mut parsed) => {
                parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
                for driver in &mut parsed.drivers {
                    *driver = driver.to_uppercase();
                }
                info!(
                    query_type = ?parsed.query_type,
                    scope = ?parsed.scope,
                    drivers = ?parsed.drivers,
                    confidence = parsed.confidence,
                    "Query understood"
                );
                parsed
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse understanding response, using fallback");
                Understanding::fallback(PARSE_FALLBACK_CONFIDENCE)
            }
        },
        Err(e) => {
            warn!(error = %e, "Intent extraction call failed, using fallback");
            Understanding::fallback(PROVIDER_FALLBACK_CONFIDENCE)
        }
    };

    state.understanding = Some(understanding);
}

/// Format the tail of the conversation for the prompt.
fn format_history(messages: &[Message], limit: usize) -> String {
    let start = messages.len().saturating_sub(limit);
    let lines: Vec<String> = messages[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            let content: String = m.content.chars().take(200).collect();
            format!("{role}: {content}")
        })
        .collect();
    if lines.is_empty() {
        "No previous conversation".into()
    } else {
        lines.join("\n")
    }
}
