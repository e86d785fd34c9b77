//! PLAN stage — turn understanding (plus any evaluation feedback) into an
//! execution plan.
//!
//! The planner LLM chooses tools from the registry catalog. Its output is
//! validated at construction time; when it cannot be parsed at all, a
//! heuristic plan built from the understanding keeps the turn moving.

use gridline_core::message::Message;
use gridline_core::plan::{ExecutionPlan, ToolCall};
use gridline_core::provider::Tier;
use gridline_core::state::{PipelineState, Understanding};
use gridline_core::tool::ToolRegistry;
use gridline_providers::ProviderRouter;
use serde_json::json;
use tracing::{info, warn};

use crate::prompts;

pub async fn run(state: &mut PipelineState, router: &ProviderRouter, registry: &ToolRegistry) {
    let understanding = state.understanding.clone().unwrap_or_default();

    let messages = vec![
        Message::system(prompts::PLAN_SYSTEM),
        Message::user(prompts::plan_prompt(
            &understanding,
            &registry.specs(),
            &state.feedback,
        )),
    ];

    let mut plan = match router.generate(&messages, Tier::Capable).await {
        Ok(text) => match serde_json::from_str::<ExecutionPlan>(prompts::extract_json(&text)) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Failed to parse plan response, using fallback plan");
                fallback_plan(&understanding)
            }
        },
        Err(e) => {
            warn!(error = %e, "Planning call failed, using fallback plan");
            fallback_plan(&understanding)
        }
    };

    let rejected = plan.validate(registry);
    let dangling = plan.dangling_ids().len();
    info!(
        calls = plan.tool_calls.len(),
        groups = plan.parallel_groups.len(),
        rejected,
        dangling,
        "Plan created"
    );

    state.plan = Some(plan);
}

/// A basic plan synthesized from the understanding when LLM planning
/// fails: session results for the season, lap times for up to two drivers,
/// lap fetches grouped for concurrent execution.
fn fallback_plan(understanding: &Understanding) -> ExecutionPlan {
    let mut tool_calls = Vec::new();
    let season = understanding.seasons.first().copied().unwrap_or(2025);

    if !understanding.seasons.is_empty() {
        let mut results = ToolCall::new("results", "get_session_results")
            .with_param("season", json!(season))
            .with_purpose("Get session results");
        if let Some(event) = understanding.events.first() {
            results = results.with_param("event", json!(event));
        }
        tool_calls.push(results);
    }

    for driver in understanding.drivers.iter().take(2) {
        let mut call = ToolCall::new(format!("laps_{driver}"), "get_lap_times")
            .with_param("driver", json!(driver))
            .with_param("season", json!(season))
            .with_purpose(format!("Get lap times for {driver}"));
        if let Some(event) = understanding.events.first() {
            call = call.with_param("event", json!(event));
        }
        tool_calls.push(call);
    }

    // All lap fetches are independent of each other
    let lap_ids: Vec<String> = tool_calls
        .iter()
        .filter(|tc| tc.id.starts_with("laps_"))
        .map(|tc| tc.id.clone())
        .collect();
    let parallel_groups = if lap_ids.is_empty() {
        Vec::new()
    } else {
        vec![lap_ids]
    };

    ExecutionPlan {
        tool_calls,
        parallel_groups,
        expected_records: 100,
        reasoning: "Fallback plan: fetch results and lap times for mentioned drivers".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failing_router, scripted_router};
    use gridline_core::state::QueryKind;

    fn comparison_state() -> PipelineState {
        let mut state = PipelineState::new("s");
        state.begin_turn("compare VER and NOR");
        state.understanding = Some(Understanding {
            query_type: QueryKind::Comparison,
            drivers: vec!["VER".into(), "NOR".into()],
            seasons: vec![2025],
            ..Understanding::default()
        });
        state
    }

    #[tokio::test]
    async fn parses_planner_output_and_validates() {
        let router = scripted_router(vec![
            r#"{"tool_calls": [
                 {"id": "laps_VER", "tool_name": "get_lap_times",
                  "parameters": {"driver": "VER"}, "purpose": "VER laps"},
                 {"id": "forecast", "tool_name": "get_weather_forecast",
                  "parameters": {}, "purpose": "not a real tool"}
               ],
               "parallel_groups": [["laps_VER", "forecast"]],
               "expected_records": 60,
               "reasoning": "laps for both"}"#,
        ]);
        let registry = gridline_tools::default_registry();

        let mut state = comparison_state();
        run(&mut state, &router, &registry).await;

        let plan = state.plan.unwrap();
        assert_eq!(plan.tool_calls.len(), 2);
        assert!(plan.call("laps_VER").unwrap().invalid.is_none());
        // The made-up tool was rejected at construction time
        assert!(plan.call("forecast").unwrap().invalid.is_some());
    }

    #[tokio::test]
    async fn unparseable_output_uses_fallback_plan() {
        let router = scripted_router(vec!["Let me think about which tools to call..."]);
        let registry = gridline_tools::default_registry();

        let mut state = comparison_state();
        run(&mut state, &router, &registry).await;

        let plan = state.plan.unwrap();
        // results + laps_VER + laps_NOR
        assert_eq!(plan.tool_calls.len(), 3);
        assert_eq!(
            plan.parallel_groups,
            vec![vec!["laps_VER".to_string(), "laps_NOR".to_string()]]
        );
        assert!(plan.tool_calls.iter().all(|tc| tc.invalid.is_none()));
    }

    #[tokio::test]
    async fn provider_failure_uses_fallback_plan() {
        let router = failing_router();
        let registry = gridline_tools::default_registry();

        let mut state = comparison_state();
        run(&mut state, &router, &registry).await;
        assert!(state.plan.is_some());
        assert!(!state.plan.unwrap().tool_calls.is_empty());
    }

    #[test]
    fn fallback_plan_without_entities_is_empty() {
        let plan = fallback_plan(&Understanding::default());
        assert!(plan.tool_calls.is_empty());
        assert!(plan.parallel_groups.is_empty());
    }

    #[test]
    fn fallback_plan_caps_drivers_at_two() {
        let understanding = Understanding {
            drivers: vec!["VER".into(), "NOR".into(), "LEC".into()],
            seasons: vec![2025],
            ..Understanding::default()
        };
        let plan = fallback_plan(&understanding);
        let lap_calls = plan
            .tool_calls
            .iter()
            .filter(|tc| tc.tool_name == "get_lap_times")
            .count();
        assert_eq!(lap_calls, 2);
    }
}
