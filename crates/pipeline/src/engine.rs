//! The pipeline engine — one turn's state machine.
//!
//! UNDERSTAND → PLAN → EXECUTE → PROCESS → EVALUATE, with the EVALUATE
//! fan-out looping back to PLAN (carrying feedback) until the evidence is
//! sufficient or the iteration cap forces progression; then ENRICH →
//! GENERATE → VALIDATE → DONE.
//!
//! The engine's contract with the caller is simple: `run_turn` always
//! returns an answer. Stage failures degrade the turn (recorded on
//! `PipelineState.error`), they never propagate out.

use gridline_config::PipelineConfig;
use gridline_core::message::Message;
use gridline_core::search::SearchBackend;
use gridline_core::session::SessionStore;
use gridline_core::state::{Answer, PipelineState};
use gridline_core::tool::ToolRegistry;
use gridline_providers::ProviderRouter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::evaluator::SufficiencyEvaluator;
use crate::executor::ToolExecutionEngine;
use crate::stages::enrich::EnrichedContext;
use crate::stages::{enrich, generate, plan, process, understand, validate};

/// The stages of one turn. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Understand,
    Plan,
    Execute,
    Process,
    Evaluate,
    Enrich,
    Generate,
    Validate,
    Done,
}

pub struct PipelineEngine {
    router: Arc<ProviderRouter>,
    tools: Arc<ToolRegistry>,
    search: Arc<dyn SearchBackend>,
    sessions: Arc<dyn SessionStore>,
    executor: ToolExecutionEngine,
    evaluator: SufficiencyEvaluator,
    turn_timeout: Duration,
    validate_answers: bool,
}

impl PipelineEngine {
    pub fn new(
        router: Arc<ProviderRouter>,
        tools: Arc<ToolRegistry>,
        search: Arc<dyn SearchBackend>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            router,
            tools,
            search,
            sessions,
            executor: ToolExecutionEngine::new(),
            evaluator: SufficiencyEvaluator::new(),
            turn_timeout: Duration::from_secs(120),
            validate_answers: true,
        }
    }

    /// Apply the hardening knobs from configuration.
    pub fn with_pipeline_config(mut self, config: &PipelineConfig) -> Self {
        self.executor = ToolExecutionEngine::new()
            .with_tool_timeout(Duration::from_secs(config.tool_timeout_secs))
            .with_max_concurrent(config.max_concurrent_tools);
        self.evaluator = SufficiencyEvaluator::new().with_max_iterations(config.max_iterations);
        self.turn_timeout = Duration::from_secs(config.turn_timeout_secs);
        self.validate_answers = config.validate_answers;
        self
    }

    /// Set the wall-clock budget for one turn.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Enable or disable the VALIDATE stage.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_answers = enabled;
        self
    }

    /// Process one user message and produce the answer.
    ///
    /// Session state is loaded at entry and saved at exit; a store failure
    /// on either side is logged and absorbed — the turn still runs (on a
    /// fresh state) and still answers.
    pub async fn run_turn(&self, session_id: &str, user_message: &str) -> Answer {
        let mut state = match self.sessions.load(session_id).await {
            Ok(Some(state)) => state,
            Ok(None) => PipelineState::new(session_id),
            Err(e) => {
                warn!(session_id, error = %e, "Session load failed, starting fresh");
                PipelineState::new(session_id)
            }
        };

        state.begin_turn(user_message);
        info!(session_id, "Turn started");

        let answer = match tokio::time::timeout(self.turn_timeout, self.advance(&mut state)).await
        {
            Ok(answer) => answer,
            Err(_) => {
                warn!(
                    session_id,
                    budget_secs = self.turn_timeout.as_secs(),
                    "Turn exceeded its wall-clock budget"
                );
                state.error = Some(format!(
                    "turn exceeded {}s wall-clock budget",
                    self.turn_timeout.as_secs()
                ));
                Answer::degraded(
                    "The analysis took longer than the time available for this turn. \
                     Please try a narrower question.",
                )
            }
        };

        state.answer = Some(answer.clone());
        state.messages.push(Message::assistant(&answer.text));

        if let Err(e) = self.sessions.save(session_id, &state).await {
            warn!(session_id, error = %e, "Session save failed");
        }

        info!(
            session_id,
            iterations = state.iteration_count,
            degraded = answer.degraded,
            "Turn complete"
        );
        answer
    }

    /// Walk the state machine to DONE.
    async fn advance(&self, state: &mut PipelineState) -> Answer {
        let mut stage = Stage::Understand;
        let mut context = EnrichedContext::default();

        while stage != Stage::Done {
            debug!(?stage, session_id = %state.session_id, "Entering stage");

            stage = match stage {
                Stage::Understand => {
                    understand::run(state, &self.router).await;
                    Stage::Plan
                }
                Stage::Plan => {
                    plan::run(state, &self.router, &self.tools).await;
                    Stage::Execute
                }
                Stage::Execute => {
                    let plan = state.plan.clone().unwrap_or_default();
                    let results = self.executor.execute(&plan, &self.tools).await;
                    state.raw_results.extend(results);
                    Stage::Process
                }
                Stage::Process => {
                    process::run(state);
                    Stage::Evaluate
                }
                Stage::Evaluate => {
                    let analysis = state.analysis.clone().unwrap_or_default();
                    let query_type = state
                        .understanding
                        .as_ref()
                        .map(|u| u.query_type)
                        .unwrap_or_default();

                    let result =
                        self.evaluator
                            .evaluate(&analysis, query_type, state.iteration_count);
                    state.iteration_count = result.iteration;
                    state.feedback = result.feedback.clone();
                    let sufficient = result.sufficient;
                    state.evaluation = Some(result);

                    if sufficient {
                        Stage::Enrich
                    } else {
                        Stage::Plan
                    }
                }
                Stage::Enrich => {
                    context = enrich::run(state, self.search.as_ref()).await;
                    Stage::Generate
                }
                Stage::Generate => {
                    generate::run(state, &self.router, &context).await;
                    // A terminal generation failure skips straight to DONE
                    if state.error.is_some() || !self.validate_answers {
                        Stage::Done
                    } else {
                        Stage::Validate
                    }
                }
                Stage::Validate => {
                    validate::run(state, &self.router).await;
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }

        state.answer.clone().unwrap_or_else(|| {
            // Every path through GENERATE sets an answer; this is the
            // last-resort guarantee that a turn never ends silent.
            Answer::degraded("I wasn't able to produce an analysis for this question.")
        })
    }
}
