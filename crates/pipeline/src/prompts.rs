//! Prompt templates for the LLM-backed stages.
//!
//! Wording here is deliberately plain; the structured parts (JSON shapes,
//! tool catalogs, evidence sections) are what the stages depend on.

use gridline_core::state::{ProcessedAnalysis, Understanding};
use gridline_core::tool::ToolSpec;

pub const UNDERSTAND_SYSTEM: &str = "\
You are the intent extraction stage of a motorsport data analyst. \
Given a user question and recent conversation, extract structured intent. \
Respond with ONLY a JSON object with these fields:
{
  \"query_type\": one of \"comparison\" | \"strategy\" | \"pace\" | \"telemetry\" | \"incident\" | \"prediction\" | \"historical\" | \"results\" | \"general\",
  \"scope\": one of \"single_lap\" | \"stint\" | \"full_race\" | \"multi_race\" | \"qualifying\" | \"practice\",
  \"drivers\": [three-letter driver codes],
  \"teams\": [team names],
  \"events\": [event names, e.g. \"Monza\"],
  \"seasons\": [years as integers],
  \"metrics\": [metric names, e.g. \"lap_time\", \"tire_deg\"],
  \"sub_questions\": [decomposed sub-questions for complex queries],
  \"confidence\": number between 0 and 1
}";

pub fn understand_prompt(user_message: &str, history: &str) -> String {
    format!(
        "Recent conversation:\n{history}\n\nUser question:\n{user_message}\n\n\
         Extract the intent as JSON."
    )
}

pub const PLAN_SYSTEM: &str = "\
You are the retrieval planner of a motorsport data analyst. \
Decide which tools to call to gather the evidence the question needs, and \
group independent calls so they can run concurrently. \
Respond with ONLY a JSON object:
{
  \"tool_calls\": [
    {\"id\": \"unique_id\", \"tool_name\": \"...\", \"parameters\": {...},
     \"depends_on\": [ids], \"purpose\": \"why\"}
  ],
  \"parallel_groups\": [[ids that may run concurrently]],
  \"expected_records\": integer,
  \"reasoning\": \"one sentence\"
}
Rules: every id referenced by parallel_groups or depends_on must name a \
tool call in the list. Use lap-time calls with ids like laps_VER so the \
aggregator can attribute records to drivers.";

pub fn plan_prompt(understanding: &Understanding, catalog: &[ToolSpec], feedback: &str) -> String {
    let understanding_json =
        serde_json::to_string_pretty(understanding).unwrap_or_else(|_| "{}".into());

    let mut tools = String::new();
    for spec in catalog {
        tools.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            spec.name, spec.description, spec.parameters
        ));
    }

    let feedback_section = if feedback.is_empty() {
        String::new()
    } else {
        format!(
            "\n\nPREVIOUS ATTEMPT FEEDBACK:\n{feedback}\n\nAdjust the plan to fetch the missing data."
        )
    };

    format!(
        "Query understanding:\n{understanding_json}\n\nAvailable tools:\n{tools}{feedback_section}\n\nProduce the execution plan as JSON."
    )
}

pub const GENERATE_SYSTEM: &str = "\
You are a motorsport race analyst. Answer the user's question using ONLY \
the evidence provided: quote specific numbers, name the drivers involved, \
and acknowledge gaps when the data is incomplete. Keep the answer focused \
and data-driven.";

#[allow(clippy::too_many_arguments)]
pub fn generate_prompt(
    user_query: &str,
    raw_results: &str,
    analysis: &ProcessedAnalysis,
    analysis_sections: &str,
    enriched_sections: &str,
    chart_note: &str,
) -> String {
    let missing = if analysis.missing_data.is_empty() {
        "None".to_string()
    } else {
        analysis.missing_data.join(", ")
    };

    format!(
        "User question:\n{user_query}\n\n\
         ## Raw tool results\n{raw_results}\n\n\
         ## Aggregated analysis\n{analysis_sections}\n\n\
         ## Context\n{enriched_sections}\n\n\
         Data completeness: {completeness:.0}%\n\
         Missing data: {missing}{chart_note}\n\n\
         Write the answer.",
        completeness = analysis.completeness_score * 100.0,
    )
}

pub const VALIDATE_SYSTEM: &str = "\
You are a quality checker for race analysis answers. Evaluate the answer \
for completeness (addresses all parts of the question), accuracy (specific \
numbers are cited), relevance, and caveats (limitations acknowledged when \
data is incomplete). Respond with ONLY a JSON object:
{
  \"passes_validation\": true or false,
  \"score\": number between 0 and 1,
  \"issues\": [short issue descriptions],
  \"suggestions\": [short improvement suggestions]
}";

pub fn validate_prompt(
    user_query: &str,
    sub_questions: &[String],
    response: &str,
    completeness: f32,
) -> String {
    let subs = if sub_questions.is_empty() {
        "None specified".to_string()
    } else {
        sub_questions
            .iter()
            .map(|q| format!("- {q}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    // Cap the echoed answer for token efficiency
    let shown: String = response.chars().take(2000).collect();

    format!(
        "User's question:\n{user_query}\n\nSub-questions to address:\n{subs}\n\n\
         Generated answer:\n{shown}\n\n\
         Data completeness: {pct:.0}%\n\n\
         Evaluate whether this answer adequately addresses the question. \
         Return ONLY the JSON verdict.",
        pct = completeness * 100.0,
    )
}

/// Pull the JSON payload out of an LLM response, tolerating markdown fences.
pub fn extract_json(content: &str) -> &str {
    if let Some(start) = content.find("```json") {
        let rest = &content[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = content.find("```") {
        let rest = &content[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    content.trim()
}
