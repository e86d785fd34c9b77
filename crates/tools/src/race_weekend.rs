//! Race weekend lookup against the graph store.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::tool::Tool;
use serde_json::{json, Value};

use crate::synthetic;

pub struct RaceWeekendTool;

#[async_trait]
impl Tool for RaceWeekendTool {
    fn name(&self) -> &str {
        "get_race_weekend"
    }

    fn description(&self) -> &str {
        "Fetch race weekend facts from the relationship graph: circuit, lap count, weather, and notable events."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event": { "type": "string", "description": "Event name, e.g. 'Monza'" },
                "season": { "type": "integer" }
            },
            "required": ["event"]
        })
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let event = parameters["event"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameters {
                tool_name: self.name().into(),
                reason: "missing required key 'event'".into(),
            })?;
        let season = parameters["season"].as_i64().unwrap_or(2025);

        let h = synthetic::seed(&format!("{event}{season}"));
        let weather = ["dry", "dry", "mixed", "wet"][(h % 4) as usize];
        let safety_cars = h % 3;

        Ok(json!({
            "event": event,
            "season": season,
            "circuit": format!("{event} Circuit"),
            "laps": 44 + (h % 30),
            "weather": weather,
            "safety_cars": safety_cars,
            "red_flags": if h % 11 == 0 { 1 } else { 0 },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn weekend_facts_present() {
        let tool = RaceWeekendTool;
        let out = tool
            .execute(json!({"event": "Monza", "season": 2025}))
            .await
            .unwrap();
        assert_eq!(out["event"], "Monza");
        assert!(out["laps"].as_u64().unwrap() >= 44);
        assert!(out["weather"].as_str().is_some());
    }

    #[tokio::test]
    async fn missing_event_is_invalid() {
        let tool = RaceWeekendTool;
        assert!(tool.execute(json!({"season": 2025})).await.is_err());
    }
}
