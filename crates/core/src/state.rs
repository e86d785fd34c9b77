//! Pipeline state — the single mutable record threaded through all stages.
//!
//! One `PipelineState` exists per session. It is loaded at turn start,
//! advanced stage by stage for the duration of one user turn, and persisted
//! at turn end. It is never shared across concurrent turns of one session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use crate::message::{last_user_content, Message};
use crate::plan::ExecutionPlan;

/// The primary kind of analysis a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Driver vs driver
    Comparison,
    /// Pit stops, tire choice
    Strategy,
    /// Lap times, consistency
    Pace,
    /// Speed traces, braking — needs exact numeric grounding
    Telemetry,
    /// Crashes, penalties
    Incident,
    /// What-if scenarios, forecasts
    Prediction,
    /// Past seasons, records
    Historical,
    /// Race results, standings
    Results,
    /// General knowledge, anything else
    General,
}

impl Default for QueryKind {
    fn default() -> Self {
        QueryKind::General
    }
}

/// Scope of the data a query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    SingleLap,
    Stint,
    FullRace,
    MultiRace,
    Qualifying,
    Practice,
}

impl Default for QueryScope {
    fn default() -> Self {
        QueryScope::FullRace
    }
}

/// Output of the UNDERSTAND stage — structured user intent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Understanding {
    #[serde(default)]
    pub query_type: QueryKind,

    #[serde(default)]
    pub scope: QueryScope,

    /// Driver codes (3-letter, e.g., VER, NOR)
    #[serde(default)]
    pub drivers: Vec<String>,

    #[serde(default)]
    pub teams: Vec<String>,

    /// Event names with year, e.g., "Monza 2025"
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default)]
    pub seasons: Vec<i32>,

    /// Specific metrics requested (lap_time, tire_deg, ...)
    #[serde(default)]
    pub metrics: Vec<String>,

    /// Decomposed sub-questions for complex queries
    #[serde(default)]
    pub sub_questions: Vec<String>,

    /// Confidence in the extraction, 0.0–1.0
    #[serde(default)]
    pub confidence: f32,
}

impl Understanding {
    /// The conservative default substituted when intent extraction fails.
    pub fn fallback(confidence: f32) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }
}

/// The result of one tool call: raw output or an error marker.
///
/// Serializes as either the raw value or `{"error": "..."}`, matching the
/// tool collaborator contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Failure { error: String },
    Success(Value),
}

impl ToolOutcome {
    pub fn success(value: Value) -> Self {
        ToolOutcome::Success(value)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Failure { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolOutcome::Failure { error } => Some(error),
            ToolOutcome::Success(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Success(v) => Some(v),
            ToolOutcome::Failure { .. } => None,
        }
    }
}

/// Aggregated lap statistics for one driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LapStats {
    pub driver: String,
    #[serde(default)]
    pub total_laps: u32,
    /// Fastest lap in seconds
    #[serde(default)]
    pub fastest_lap: Option<f64>,
    #[serde(default)]
    pub fastest_lap_number: Option<u32>,
    /// Mean lap time in seconds
    #[serde(default)]
    pub average_pace: Option<f64>,
    /// Standard deviation of lap times
    #[serde(default)]
    pub consistency: Option<f64>,
}

/// Summary of a single tire stint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StintSummary {
    pub stint_number: u32,
    /// Tire compound (SOFT, MEDIUM, HARD)
    pub compound: String,
    pub start_lap: u32,
    pub end_lap: u32,
    pub total_laps: u32,
    #[serde(default)]
    pub average_pace: Option<f64>,
    /// Seconds lost per lap over the stint
    #[serde(default)]
    pub degradation_per_lap: Option<f64>,
}

/// Head-to-head comparison between two drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverComparison {
    pub driver_a: String,
    pub driver_b: String,
    /// Positive = driver_a faster, seconds per lap
    #[serde(default)]
    pub pace_delta: Option<f64>,
    #[serde(default)]
    pub fastest_lap_delta: Option<f64>,
    #[serde(default)]
    pub laps_compared: u32,
}

/// Output of the PROCESS stage — aggregated, LLM-ready evidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessedAnalysis {
    /// Per-driver lap statistics
    #[serde(default)]
    pub lap_stats: BTreeMap<String, LapStats>,

    /// Per-driver stint summaries
    #[serde(default)]
    pub stints: BTreeMap<String, Vec<StintSummary>>,

    #[serde(default)]
    pub comparisons: Vec<DriverComparison>,

    /// Pre-computed key findings, one sentence each
    #[serde(default)]
    pub key_insights: Vec<String>,

    /// How complete the data is for the query, 0.0–1.0
    #[serde(default)]
    pub completeness_score: f32,

    /// How reliable the data is, 0.0–1.0
    #[serde(default)]
    pub confidence_score: f32,

    /// Descriptions of data that could not be fetched
    #[serde(default)]
    pub missing_data: Vec<String>,
}

/// Output of the EVALUATE stage — the sufficiency verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub sufficient: bool,
    pub score: f32,
    /// Feedback for the next PLAN round; empty when sufficient
    #[serde(default)]
    pub feedback: String,
    /// Iteration at which the judgment was made
    #[serde(default)]
    pub iteration: u32,
}

/// Chart families the answer can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    LapProgression,
    LapComparison,
    BoxPlot,
    TireStrategy,
    BarChart,
    Table,
}

/// Specification for frontend chart rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    #[serde(default)]
    pub drivers: Vec<String>,
    /// Chart data, shaped per kind
    #[serde(default)]
    pub series: Value,
}

/// The final product of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,

    /// Confidence/completeness indicator surfaced with the answer
    #[serde(default)]
    pub confidence: f32,

    /// True when the turn completed on a degraded path (exhausted backends,
    /// iteration cap without sufficiency, stage failure)
    #[serde(default)]
    pub degraded: bool,
}

impl Answer {
    pub fn degraded(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chart: None,
            confidence: 0.0,
            degraded: true,
        }
    }
}

/// The state record threaded through every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,

    /// Append-only conversation history
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub understanding: Option<Understanding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,

    /// Raw tool output keyed by tool-call id; accumulates across re-plan
    /// rounds within one turn
    #[serde(default)]
    pub raw_results: BTreeMap<String, ToolOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProcessedAnalysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,

    /// Evaluation feedback carried into the next PLAN round
    #[serde(default)]
    pub feedback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,

    /// Re-plan rounds consumed this turn
    #[serde(default)]
    pub iteration_count: u32,

    /// Last fatal error, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineState {
    /// Create a fresh state for a session with no stored history.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            understanding: None,
            plan: None,
            raw_results: BTreeMap::new(),
            analysis: None,
            evaluation: None,
            feedback: String::new(),
            answer: None,
            iteration_count: 0,
            error: None,
        }
    }

    /// Reset turn-scoped fields and append the incoming user message.
    /// Conversation history is the only thing that survives across turns.
    pub fn begin_turn(&mut self, user_message: impl Into<String>) {
        self.messages.push(Message::user(user_message));
        self.understanding = None;
        self.plan = None;
        self.raw_results.clear();
        self.analysis = None;
        self.evaluation = None;
        self.feedback.clear();
        self.answer = None;
        self.iteration_count = 0;
        self.error = None;
    }

    /// The message this turn is answering.
    pub fn current_query(&self) -> &str {
        last_user_content(&self.messages).unwrap_or("")
    }
}
