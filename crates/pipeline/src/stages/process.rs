//! PROCESS stage — pure aggregation of raw tool output.
//!
//! No LLM is involved here: lap statistics, stint summaries, comparisons,
//! and the completeness/confidence scores are computed directly from the
//! result map. Error markers become `missing_data` entries; they never
//! abort aggregation.

use gridline_core::state::{
    DriverComparison, LapStats, PipelineState, ProcessedAnalysis, QueryKind, StintSummary,
    ToolOutcome, Understanding,
};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// One parsed lap row. Only the fields aggregation needs.
#[derive(Debug, Clone)]
struct LapRecord {
    number: u32,
    seconds: f64,
    compound: Option<String>,
    stint: Option<u32>,
}

pub fn run(state: &mut PipelineState) {
    let understanding = state.understanding.clone().unwrap_or_default();
    let mut analysis = ProcessedAnalysis::default();

    let mut has_lap_times = false;
    let mut laps_by_driver: BTreeMap<String, Vec<LapRecord>> = BTreeMap::new();

    for (tool_id, outcome) in &state.raw_results {
        match outcome {
            ToolOutcome::Failure { error } => {
                analysis.missing_data.push(format!("{tool_id}: {error}"));
            }
            ToolOutcome::Success(value) => {
                let id_lower = tool_id.to_lowercase();
                if id_lower.contains("laps") || id_lower.contains("lap_times") {
                    has_lap_times = true;
                    if let Some(driver) = driver_from_tool_id(tool_id) {
                        laps_by_driver.insert(driver, parse_lap_records(value));
                    }
                }
            }
        }
    }

    for (driver, records) in &laps_by_driver {
        analysis
            .lap_stats
            .insert(driver.clone(), lap_statistics(driver, records));

        let stints = stint_summaries(records);
        if !stints.is_empty() {
            analysis.stints.insert(driver.clone(), stints);
        }
    }

    if understanding.query_type == QueryKind::Comparison && analysis.lap_stats.len() >= 2 {
        let drivers: Vec<&LapStats> = analysis.lap_stats.values().collect();
        if let Some(comparison) = compare(drivers[0], drivers[1]) {
            analysis.key_insights.extend(comparison_insights(&comparison));
            analysis.comparisons.push(comparison);
        }
    }

    for stats in analysis.lap_stats.values() {
        if let (Some(fastest), Some(number)) = (stats.fastest_lap, stats.fastest_lap_number) {
            analysis.key_insights.push(format!(
                "{}'s fastest lap: {fastest:.3}s (lap {number})",
                stats.driver
            ));
        }
        if let Some(pace) = stats.average_pace {
            analysis.key_insights.push(format!(
                "{}'s average pace: {pace:.3}s over {} laps",
                stats.driver, stats.total_laps
            ));
        }
    }

    let has_stints = !analysis.stints.is_empty();
    analysis.completeness_score =
        completeness(&understanding, &analysis, has_lap_times, has_stints);
    analysis.confidence_score = confidence(&analysis, state.raw_results.len());

    info!(
        drivers = analysis.lap_stats.len(),
        completeness = analysis.completeness_score,
        confidence = analysis.confidence_score,
        missing = analysis.missing_data.len(),
        "Aggregation complete"
    );

    state.analysis = Some(analysis);
}

/// Extract a driver code from an id like "laps_VER" or "lap_times_NOR".
fn driver_from_tool_id(tool_id: &str) -> Option<String> {
    tool_id
        .split('_')
        .find(|part| part.len() == 3 && part.chars().all(|c| c.is_ascii_uppercase()))
        .map(String::from)
}

/// Parse lap rows from a tool payload: either a bare array or `{data: [...]}`.
fn parse_lap_records(value: &Value) -> Vec<LapRecord> {
    let rows = match value {
        Value::Array(rows) => rows.as_slice(),
        Value::Object(obj) => obj
            .get("data")
            .and_then(|d| d.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
        _ => &[],
    };

    let mut records: Vec<LapRecord> = rows
        .iter()
        .filter_map(|row| {
            let seconds = row
                .get("lap_time_seconds")
                .or_else(|| row.get("lap_time"))
                .and_then(Value::as_f64)?;
            Some(LapRecord {
                number: row.get("lap_number").and_then(Value::as_u64).unwrap_or(0) as u32,
                seconds,
                compound: row
                    .get("compound")
                    .and_then(Value::as_str)
                    .map(String::from),
                stint: row.get("stint").and_then(Value::as_u64).map(|s| s as u32),
            })
        })
        .collect();
    records.sort_by_key(|r| r.number);
    records
}

fn lap_statistics(driver: &str, records: &[LapRecord]) -> LapStats {
    let mut stats = LapStats {
        driver: driver.to_string(),
        total_laps: records.len() as u32,
        ..LapStats::default()
    };
    if records.is_empty() {
        return stats;
    }

    let fastest = records
        .iter()
        .min_by(|a, b| a.seconds.partial_cmp(&b.seconds).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(lap) = fastest {
        stats.fastest_lap = Some(lap.seconds);
        stats.fastest_lap_number = Some(lap.number);
    }

    let mean = records.iter().map(|r| r.seconds).sum::<f64>() / records.len() as f64;
    stats.average_pace = Some(mean);

    if records.len() > 1 {
        let variance = records
            .iter()
            .map(|r| (r.seconds - mean).powi(2))
            .sum::<f64>()
            / records.len() as f64;
        stats.consistency = Some(variance.sqrt());
    }

    stats
}

/// Cut the lap sequence at stint boundaries and summarize each piece.
fn stint_summaries(records: &[LapRecord]) -> Vec<StintSummary> {
    let mut groups: Vec<Vec<&LapRecord>> = Vec::new();
    let mut current: Option<u32> = None;
    for rec in records {
        let Some(stint) = rec.stint else { continue };
        if current != Some(stint) {
            groups.push(Vec::new());
            current = Some(stint);
        }
        if let Some(group) = groups.last_mut() {
            group.push(rec);
        }
    }

    groups
        .into_iter()
        .filter(|laps| !laps.is_empty())
        .map(|laps| {
            let first = laps[0];
            let last = laps[laps.len() - 1];
            let mean = laps.iter().map(|r| r.seconds).sum::<f64>() / laps.len() as f64;
            StintSummary {
                stint_number: first.stint.unwrap_or(0),
                compound: first.compound.clone().unwrap_or_else(|| "UNKNOWN".into()),
                start_lap: first.number,
                end_lap: last.number,
                total_laps: laps.len() as u32,
                average_pace: Some(mean),
                degradation_per_lap: slope(&laps),
            }
        })
        .collect()
}

/// Least-squares slope of lap time over lap index — seconds lost per lap.
fn slope(laps: &[&LapRecord]) -> Option<f64> {
    if laps.len() < 2 {
        return None;
    }
    let n = laps.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = laps.iter().map(|r| r.seconds).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, rec) in laps.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (rec.seconds - mean_y);
        den += dx * dx;
    }
    (den > 0.0).then(|| num / den)
}

/// Head-to-head comparison; requires lap data on both sides.
fn compare(a: &LapStats, b: &LapStats) -> Option<DriverComparison> {
    let (pace_a, pace_b) = (a.average_pace?, b.average_pace?);
    Some(DriverComparison {
        driver_a: a.driver.clone(),
        driver_b: b.driver.clone(),
        // Positive = driver_a faster
        pace_delta: Some(pace_b - pace_a),
        fastest_lap_delta: match (a.fastest_lap, b.fastest_lap) {
            (Some(fa), Some(fb)) => Some(fb - fa),
            _ => None,
        },
        laps_compared: a.total_laps.min(b.total_laps),
    })
}

fn comparison_insights(comparison: &DriverComparison) -> Vec<String> {
    let mut insights = Vec::new();
    if let Some(delta) = comparison.pace_delta {
        let faster = if delta > 0.0 {
            &comparison.driver_a
        } else {
            &comparison.driver_b
        };
        insights.push(format!(
            "{faster} was {:.3}s per lap faster on average over {} laps",
            delta.abs(),
            comparison.laps_compared
        ));
    }
    if let Some(delta) = comparison.fastest_lap_delta {
        let faster = if delta > 0.0 {
            &comparison.driver_a
        } else {
            &comparison.driver_b
        };
        insights.push(format!(
            "{faster} set the quicker fastest lap, by {:.3}s",
            delta.abs()
        ));
    }
    insights
}

/// How complete the data is for this query, 0.0–1.0.
fn completeness(
    understanding: &Understanding,
    analysis: &ProcessedAnalysis,
    has_lap_times: bool,
    has_stints: bool,
) -> f32 {
    let mut score = 0.0f32;
    let mut max = 0.0f32;
    let kind = understanding.query_type;

    if !understanding.drivers.is_empty() {
        max += 1.0;
        let found = analysis.lap_stats.len() as f32;
        let requested = understanding.drivers.len() as f32;
        score += (found / requested).min(1.0);
    }

    if matches!(kind, QueryKind::Comparison | QueryKind::Pace) {
        max += 1.0;
        if has_lap_times {
            let total: u32 = analysis.lap_stats.values().map(|s| s.total_laps).sum();
            score += if total >= 50 {
                1.0
            } else if total >= 20 {
                0.7
            } else {
                0.3
            };
        }
    }

    if kind == QueryKind::Strategy {
        max += 1.0;
        if has_stints {
            score += 1.0;
        }
    }

    if kind == QueryKind::Comparison {
        max += 1.0;
        if !analysis.comparisons.is_empty() {
            score += 1.0;
        }
    }

    if max > 0.0 { score / max } else { 0.5 }
}

/// How reliable the data is: success rate scaled by lap volume.
fn confidence(analysis: &ProcessedAnalysis, total_results: usize) -> f32 {
    if total_results == 0 {
        return 0.0;
    }
    let errors = analysis.missing_data.len();
    let success_rate = (total_results - errors.min(total_results)) as f32 / total_results as f32;

    let total_laps: u32 = analysis.lap_stats.values().map(|s| s.total_laps).sum();
    let lap_factor = (total_laps as f32 / 100.0).min(1.0);

    success_rate * lap_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_laps(base: f64, count: u32) -> Value {
        let rows: Vec<Value> = (1..=count)
            .map(|lap| {
                let stint = (lap - 1) / 18;
                let compound = ["MEDIUM", "HARD", "SOFT"][stint as usize % 3];
                json!({
                    "lap_number": lap,
                    "lap_time_seconds": base + f64::from(lap % 5) * 0.1 + f64::from(stint) * 0.3,
                    "compound": compound,
                    "stint": stint + 1,
                })
            })
            .collect();
        Value::Array(rows)
    }

    fn comparison_state(ver_laps: Value, nor_laps: Value) -> PipelineState {
        let mut state = PipelineState::new("s");
        state.begin_turn("compare VER and NOR");
        state.understanding = Some(Understanding {
            query_type: QueryKind::Comparison,
            drivers: vec!["VER".into(), "NOR".into()],
            ..Understanding::default()
        });
        state
            .raw_results
            .insert("laps_VER".into(), ToolOutcome::success(ver_laps));
        state
            .raw_results
            .insert("laps_NOR".into(), ToolOutcome::success(nor_laps));
        state
    }

    #[test]
    fn full_comparison_scores_high() {
        let mut state = comparison_state(make_laps(80.0, 52), make_laps(80.4, 52));
        run(&mut state);

        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.lap_stats.len(), 2);
        assert_eq!(analysis.lap_stats["VER"].total_laps, 52);
        assert_eq!(analysis.comparisons.len(), 1);
        assert!(analysis.completeness_score >= 0.95);
        assert!(!analysis.key_insights.is_empty());

        // NOR keys sort before VER; driver_a = NOR, 0.4s slower → negative delta
        let comparison = &analysis.comparisons[0];
        assert_eq!(comparison.driver_a, "NOR");
        assert!(comparison.pace_delta.unwrap() < 0.0);
        assert_eq!(comparison.laps_compared, 52);
    }

    #[test]
    fn empty_results_score_low() {
        let mut state = comparison_state(json!([]), json!([]));
        run(&mut state);

        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.lap_stats["VER"].total_laps, 0);
        assert!(analysis.comparisons.is_empty());
        assert!(analysis.completeness_score < 0.75);
        assert_eq!(analysis.confidence_score, 0.0);
    }

    #[test]
    fn error_markers_become_missing_data() {
        let mut state = comparison_state(make_laps(80.0, 52), json!([]));
        state.raw_results.insert(
            "stints_VER".into(),
            ToolOutcome::failure("store unreachable"),
        );
        run(&mut state);

        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.missing_data.len(), 1);
        assert!(analysis.missing_data[0].contains("stints_VER"));
        assert!(analysis.missing_data[0].contains("store unreachable"));
    }

    #[test]
    fn stint_summaries_cut_at_boundaries() {
        let mut state = comparison_state(make_laps(80.0, 52), make_laps(80.5, 52));
        run(&mut state);

        let analysis = state.analysis.unwrap();
        let stints = &analysis.stints["VER"];
        assert_eq!(stints.len(), 3);
        assert_eq!(stints[0].compound, "MEDIUM");
        assert_eq!(stints[0].start_lap, 1);
        assert!(stints[0].average_pace.is_some());
    }

    #[test]
    fn statistics_are_sane() {
        let records = parse_lap_records(&make_laps(80.0, 20));
        let stats = lap_statistics("VER", &records);
        assert_eq!(stats.total_laps, 20);
        let fastest = stats.fastest_lap.unwrap();
        let average = stats.average_pace.unwrap();
        assert!(fastest <= average);
        assert!(stats.consistency.unwrap() < 1.0);
    }

    #[test]
    fn wrapped_data_payload_is_parsed() {
        let wrapped = json!({"data": [{"lap_number": 1, "lap_time_seconds": 81.0}]});
        let records = parse_lap_records(&wrapped);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].seconds, 81.0);
    }

    #[test]
    fn no_signals_yields_neutral_score() {
        let mut state = PipelineState::new("s");
        state.begin_turn("tell me about the sport");
        state.understanding = Some(Understanding::default());
        run(&mut state);
        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.completeness_score, 0.5);
    }

    #[test]
    fn driver_code_extraction() {
        assert_eq!(driver_from_tool_id("laps_VER"), Some("VER".into()));
        assert_eq!(driver_from_tool_id("lap_times_NOR"), Some("NOR".into()));
        assert_eq!(driver_from_tool_id("results"), None);
    }
}
