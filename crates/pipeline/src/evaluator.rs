//! Sufficiency evaluator — the corrective loop's decision point.
//!
//! Completeness thresholds are per query type: analyses that need exact
//! numeric grounding carry higher bars than contextual or speculative ones.
//! The iteration cap is the pipeline's circuit breaker against runaway
//! re-planning; hitting it forces sufficiency with whatever evidence exists.

use gridline_core::state::{EvaluationResult, ProcessedAnalysis, QueryKind};
use tracing::info;

/// Re-plan rounds allowed before progression is forced.
pub const MAX_ITERATIONS: u32 = 2;

const DEFAULT_THRESHOLD: f32 = 0.7;

/// The completeness bar for a query type.
pub fn threshold_for(query_type: QueryKind) -> f32 {
    match query_type {
        // High precision required
        QueryKind::Telemetry => 0.8,
        QueryKind::Comparison => 0.75,
        QueryKind::Strategy => 0.7,

        // Medium precision, partial data workable
        QueryKind::Pace => 0.65,
        QueryKind::Incident => 0.6,

        // Contextual/speculative, retrieval context can carry the answer
        QueryKind::Historical | QueryKind::Prediction | QueryKind::General => 0.5,

        QueryKind::Results => DEFAULT_THRESHOLD,
    }
}

pub struct SufficiencyEvaluator {
    max_iterations: u32,
}

impl SufficiencyEvaluator {
    pub fn new() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Judge the aggregated evidence.
    ///
    /// The returned `iteration` is the count of attempts consumed: it
    /// increments only on the insufficient path and is left unchanged when
    /// sufficiency is reached.
    pub fn evaluate(
        &self,
        analysis: &ProcessedAnalysis,
        query_type: QueryKind,
        iteration: u32,
    ) -> EvaluationResult {
        let threshold = threshold_for(query_type);
        let sufficient =
            analysis.completeness_score >= threshold || iteration >= self.max_iterations;

        let feedback = if sufficient {
            String::new()
        } else {
            generate_feedback(analysis)
        };

        info!(
            score = analysis.completeness_score,
            threshold,
            query_type = ?query_type,
            iteration,
            sufficient,
            "Sufficiency evaluated"
        );

        EvaluationResult {
            sufficient,
            score: analysis.completeness_score,
            feedback,
            iteration: if sufficient { iteration } else { iteration + 1 },
        }
    }
}

impl Default for SufficiencyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Name the specific gaps the next plan should close; fall back to a
/// generic completeness message when nothing specific stands out.
fn generate_feedback(analysis: &ProcessedAnalysis) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !analysis.missing_data.is_empty() {
        parts.push(format!(
            "The following data could not be retrieved: {}.",
            analysis.missing_data.join(", ")
        ));
    }

    let total_laps: u32 = analysis.lap_stats.values().map(|s| s.total_laps).sum();
    if total_laps == 0 {
        parts.push(
            "No data retrieved from the telemetry store - fetch lap times for the subjects of the query."
                .into(),
        );
    } else if total_laps < 50 {
        parts.push(format!(
            "Only {total_laps} laps retrieved. Need more lap data - increase limits or fetch additional sessions."
        ));
    }

    if analysis.comparisons.is_empty() && analysis.lap_stats.len() >= 2 {
        parts.push(
            "Comparison data not computed - ensure lap times are retrieved for all drivers.".into(),
        );
    }

    if analysis.stints.is_empty() {
        parts.push("No stint/tire data available. Consider fetching stint summaries.".into());
    }

    if parts.is_empty() {
        parts.push(format!(
            "Data completeness is {:.0}%. Try fetching additional data sources.",
            analysis.completeness_score * 100.0
        ));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridline_core::state::LapStats;

    fn analysis_with_score(score: f32) -> ProcessedAnalysis {
        ProcessedAnalysis {
            completeness_score: score,
            ..ProcessedAnalysis::default()
        }
    }

    #[test]
    fn threshold_sensitivity_at_0_72() {
        let analysis = analysis_with_score(0.72);
        let evaluator = SufficiencyEvaluator::new();

        // Strategy's bar is 0.7 — sufficient
        let strategy = evaluator.evaluate(&analysis, QueryKind::Strategy, 0);
        assert!(strategy.sufficient);
        assert!(strategy.feedback.is_empty());

        // Telemetry's bar is 0.8 — insufficient
        let telemetry = evaluator.evaluate(&analysis, QueryKind::Telemetry, 0);
        assert!(!telemetry.sufficient);
        assert!(!telemetry.feedback.is_empty());
    }

    #[test]
    fn iteration_cap_forces_sufficiency() {
        let analysis = analysis_with_score(0.1);
        let evaluator = SufficiencyEvaluator::new();

        let at_cap = evaluator.evaluate(&analysis, QueryKind::Comparison, MAX_ITERATIONS);
        assert!(at_cap.sufficient);
        assert_eq!(at_cap.iteration, MAX_ITERATIONS);
        assert!(at_cap.feedback.is_empty());
    }

    #[test]
    fn iteration_increments_only_when_insufficient() {
        let evaluator = SufficiencyEvaluator::new();

        let insufficient = evaluator.evaluate(&analysis_with_score(0.1), QueryKind::Pace, 0);
        assert_eq!(insufficient.iteration, 1);

        let sufficient = evaluator.evaluate(&analysis_with_score(0.9), QueryKind::Pace, 1);
        assert_eq!(sufficient.iteration, 1);
    }

    #[test]
    fn repeated_insufficiency_counts_attempts_up_to_cap() {
        let evaluator = SufficiencyEvaluator::new();
        let analysis = analysis_with_score(0.0);

        let mut iteration = 0;
        let mut loop_backs = 0;
        loop {
            let result = evaluator.evaluate(&analysis, QueryKind::Comparison, iteration);
            iteration = result.iteration;
            if result.sufficient {
                break;
            }
            loop_backs += 1;
        }
        assert_eq!(loop_backs, MAX_ITERATIONS);
        assert_eq!(iteration, MAX_ITERATIONS);
    }

    #[test]
    fn feedback_names_missing_data() {
        let mut analysis = analysis_with_score(0.2);
        analysis
            .missing_data
            .push("laps_VER: store unreachable".into());
        let result = SufficiencyEvaluator::new().evaluate(&analysis, QueryKind::Comparison, 0);
        assert!(result.feedback.contains("laps_VER"));
        assert!(result.feedback.contains("could not be retrieved"));
    }

    #[test]
    fn feedback_mentions_no_data_retrieved_when_empty() {
        let analysis = analysis_with_score(0.1);
        let result = SufficiencyEvaluator::new().evaluate(&analysis, QueryKind::Comparison, 0);
        assert!(result.feedback.to_lowercase().contains("no data retrieved"));
    }

    #[test]
    fn feedback_flags_missing_comparison() {
        let mut analysis = analysis_with_score(0.5);
        for driver in ["VER", "NOR"] {
            analysis.lap_stats.insert(
                driver.into(),
                LapStats {
                    driver: driver.into(),
                    total_laps: 40,
                    ..LapStats::default()
                },
            );
        }
        let result = SufficiencyEvaluator::new().evaluate(&analysis, QueryKind::Comparison, 0);
        assert!(result.feedback.contains("Comparison data not computed"));
    }

    #[test]
    fn generic_feedback_when_nothing_specific() {
        let mut analysis = analysis_with_score(0.6);
        // Enough laps, stints present, single driver — no specific gap
        analysis.lap_stats.insert(
            "VER".into(),
            LapStats {
                driver: "VER".into(),
                total_laps: 60,
                ..LapStats::default()
            },
        );
        analysis.stints.insert("VER".into(), vec![]);
        let result = SufficiencyEvaluator::new().evaluate(&analysis, QueryKind::Telemetry, 0);
        assert!(result.feedback.contains("Data completeness is 60%"));
    }
}
