//! # gridline Pipeline
//!
//! The staged agent pipeline that turns one user message into a grounded,
//! data-driven answer:
//!
//! ```text
//! UNDERSTAND → PLAN → EXECUTE → PROCESS → EVALUATE ─┬→ ENRICH → GENERATE → VALIDATE → DONE
//!                ▲                                  │
//!                └────────── (insufficient) ────────┘
//! ```
//!
//! The corrective loop re-plans with evaluator feedback until the evidence
//! clears the query type's completeness bar or the iteration cap forces
//! progression. Every failure mode degrades locally; a turn always ends
//! with an answer.

pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod prompts;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{PipelineEngine, Stage};
pub use evaluator::{threshold_for, SufficiencyEvaluator, MAX_ITERATIONS};
pub use executor::ToolExecutionEngine;
pub use stages::enrich::EnrichedContext;
