//! GENERATE stage — produce the final, data-grounded answer.
//!
//! The prompt carries the raw tool results (capped per tool), the
//! aggregated analysis, and the enriched context. A provider failure here
//! is terminal for the turn but still yields a degraded answer; the
//! pipeline never ends a turn without text for the user.

use gridline_core::message::Message;
use gridline_core::provider::Tier;
use gridline_core::state::{
    Answer, ChartKind, ChartSpec, PipelineState, ProcessedAnalysis, QueryKind, ToolOutcome,
};
use gridline_providers::ProviderRouter;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::evaluator;
use crate::prompts;
use crate::stages::enrich::EnrichedContext;

/// Items shown per tool result before truncation.
const RAW_RESULT_CAP: usize = 20;

pub async fn run(state: &mut PipelineState, router: &ProviderRouter, enriched: &EnrichedContext) {
    let understanding = state.understanding.clone().unwrap_or_default();
    let analysis = state.analysis.clone().unwrap_or_default();
    let evaluation = state.evaluation.clone().unwrap_or_default();
    let user_query = state.current_query().to_string();

    let chart = build_chart(state, &understanding.query_type, &understanding.drivers);
    let chart_note = match &chart {
        Some(spec) => format!(
            "\nA {:?} visualization will be displayed alongside your response.",
            spec.kind
        ),
        None => String::new(),
    };

    let prompt = prompts::generate_prompt(
        &user_query,
        &format_raw_results(state),
        &analysis,
        &format_analysis(&analysis),
        &format_enriched(enriched),
        &chart_note,
    );

    let messages = vec![
        Message::system(prompts::GENERATE_SYSTEM),
        Message::user(prompt),
    ];

    // Degraded when sufficiency was only reached through the iteration cap.
    let below_threshold =
        evaluation.score < evaluator::threshold_for(understanding.query_type);

    match router.generate(&messages, Tier::Capable).await {
        Ok(text) => {
            info!(
                chars = text.len(),
                degraded = below_threshold,
                "Answer generated"
            );
            state.answer = Some(Answer {
                text,
                chart,
                confidence: evaluation.score,
                degraded: below_threshold,
            });
        }
        Err(e) => {
            warn!(error = %e, "Answer generation failed, emitting degraded answer");
            state.error = Some(e.to_string());
            state.answer = Some(Answer::degraded(
                "I couldn't complete the analysis because the language model backends are \
                 temporarily unavailable. Please try again shortly.",
            ));
        }
    }
}

/// Raw tool results, arrays capped, formatted as fenced JSON per tool.
fn format_raw_results(state: &PipelineState) -> String {
    if state.raw_results.is_empty() {
        return "No raw tool data available".into();
    }

    let mut sections = Vec::new();
    for (tool_id, outcome) in &state.raw_results {
        match outcome {
            ToolOutcome::Failure { error } => {
                sections.push(format!("### {tool_id}\nError: {error}"));
            }
            ToolOutcome::Success(value) => {
                let rendered = match value {
                    Value::Array(rows) => {
                        let shown = &rows[..rows.len().min(RAW_RESULT_CAP)];
                        let body = serde_json::to_string_pretty(shown).unwrap_or_default();
                        format!(
                            "(Showing {} of {} records)\n```json\n{body}\n```",
                            shown.len(),
                            rows.len()
                        )
                    }
                    other => format!(
                        "```json\n{}\n```",
                        serde_json::to_string_pretty(other).unwrap_or_default()
                    ),
                };
                sections.push(format!("### {tool_id}\n{rendered}"));
            }
        }
    }
    sections.join("\n\n")
}

fn format_analysis(analysis: &ProcessedAnalysis) -> String {
    let mut lines = Vec::new();

    if analysis.lap_stats.is_empty() {
        lines.push("No lap analysis available".to_string());
    }
    for (driver, stats) in &analysis.lap_stats {
        lines.push(format!("### {driver}"));
        lines.push(format!("- Total laps: {}", stats.total_laps));
        if let (Some(fastest), Some(number)) = (stats.fastest_lap, stats.fastest_lap_number) {
            lines.push(format!("- Fastest lap: {fastest:.3}s (lap {number})"));
        }
        if let Some(pace) = stats.average_pace {
            lines.push(format!("- Average pace: {pace:.3}s"));
        }
        if let Some(consistency) = stats.consistency {
            lines.push(format!("- Consistency (std dev): {consistency:.3}s"));
        }
    }

    for (driver, stints) in &analysis.stints {
        lines.push(format!("### {driver} stints"));
        for stint in stints {
            lines.push(format!(
                "- Stint {}: {} compound, laps {}-{} ({} laps)",
                stint.stint_number,
                stint.compound,
                stint.start_lap,
                stint.end_lap,
                stint.total_laps
            ));
            if let Some(deg) = stint.degradation_per_lap {
                lines.push(format!("  Degradation: {deg:.3}s/lap"));
            }
        }
    }

    for comparison in &analysis.comparisons {
        lines.push(format!(
            "### {} vs {}",
            comparison.driver_a, comparison.driver_b
        ));
        if let Some(delta) = comparison.pace_delta {
            let faster = if delta > 0.0 {
                &comparison.driver_a
            } else {
                &comparison.driver_b
            };
            lines.push(format!(
                "- Average pace delta: {:.3}s ({faster} faster)",
                delta.abs()
            ));
        }
        lines.push(format!("- Laps compared: {}", comparison.laps_compared));
    }

    if !analysis.key_insights.is_empty() {
        lines.push("### Key insights".to_string());
        for insight in &analysis.key_insights {
            lines.push(format!("- {insight}"));
        }
    }

    lines.join("\n")
}

fn format_enriched(enriched: &EnrichedContext) -> String {
    let mut sections = Vec::new();

    let render = |title: &str, docs: &[super::enrich::ContextDoc]| -> Option<String> {
        if docs.is_empty() {
            return None;
        }
        let body = docs
            .iter()
            .map(|d| format!("- [{}] {}", d.label, d.content))
            .collect::<Vec<_>>()
            .join("\n");
        Some(format!("{title}:\n{body}"))
    };

    sections.extend(render("Race context", &enriched.race_context));
    sections.extend(render("Community insights", &enriched.community));
    sections.extend(render("Regulations", &enriched.regulations));
    sections.extend(render("Related past analyses", &enriched.past_analyses));

    if sections.is_empty() {
        "No additional context available".into()
    } else {
        sections.join("\n\n")
    }
}

/// Chart family for the query type, if one fits.
fn recommend_chart(kind: QueryKind) -> Option<ChartKind> {
    match kind {
        QueryKind::Comparison => Some(ChartKind::LapComparison),
        QueryKind::Pace => Some(ChartKind::LapProgression),
        QueryKind::Strategy => Some(ChartKind::TireStrategy),
        QueryKind::Results => Some(ChartKind::Table),
        _ => None,
    }
}

/// Assemble a chart spec from the per-driver lap series in the raw
/// results. No laps, no chart.
fn build_chart(state: &PipelineState, kind: &QueryKind, drivers: &[String]) -> Option<ChartSpec> {
    let chart_kind = recommend_chart(*kind)?;

    let mut series = serde_json::Map::new();
    for (tool_id, outcome) in &state.raw_results {
        let id_lower = tool_id.to_lowercase();
        if !id_lower.contains("laps") && !id_lower.contains("lap_times") {
            continue;
        }
        let Some(value) = outcome.value() else { continue };
        let Some(rows) = value.as_array() else { continue };
        let Some(driver) = tool_id
            .split('_')
            .find(|p| p.len() == 3 && p.chars().all(|c| c.is_ascii_uppercase()))
        else {
            continue;
        };

        let points: Vec<Value> = rows
            .iter()
            .filter_map(|row| {
                let lap = row.get("lap_number")?.as_u64()?;
                let seconds = row
                    .get("lap_time_seconds")
                    .or_else(|| row.get("lap_time"))?
                    .as_f64()?;
                Some(json!({"lap": lap, "seconds": seconds}))
            })
            .collect();
        if !points.is_empty() {
            series.insert(driver.to_string(), Value::Array(points));
        }
    }

    if series.is_empty() {
        return None;
    }

    Some(ChartSpec {
        id: format!("chart-{}", state.iteration_count),
        kind: chart_kind,
        title: format!("{kind:?} analysis"),
        drivers: drivers.to_vec(),
        series: Value::Object(series),
    })
}
