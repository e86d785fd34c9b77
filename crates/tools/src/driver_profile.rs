//! Driver profile lookup against the graph store.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::tool::Tool;
use serde_json::{json, Value};

use crate::synthetic;

pub struct DriverProfileTool;

#[async_trait]
impl Tool for DriverProfileTool {
    fn name(&self) -> &str {
        "get_driver_profile"
    }

    fn description(&self) -> &str {
        "Fetch a driver's profile from the relationship graph: team, career statistics, and teammate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "driver": { "type": "string", "description": "Three-letter driver code" }
            },
            "required": ["driver"]
        })
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let driver = parameters["driver"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameters {
                tool_name: self.name().into(),
                reason: "missing required key 'driver'".into(),
            })?
            .to_uppercase();

        let h = synthetic::seed(&driver);
        // Teams pair consecutive grid slots; teammate is the neighbor.
        let slot = synthetic::GRID.iter().position(|d| *d == driver);
        let teammate = slot.map(|i| synthetic::GRID[if i % 2 == 0 { i + 1 } else { i - 1 }]);

        Ok(json!({
            "code": driver,
            "team": format!("Team {}", (h % 10) + 1),
            "teammate": teammate,
            "career_starts": 40 + (h % 260),
            "career_wins": h % 60,
            "career_podiums": h % 110,
            "championships": h % 4,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn profile_has_team_and_stats() {
        let tool = DriverProfileTool;
        let out = tool.execute(json!({"driver": "ver"})).await.unwrap();
        assert_eq!(out["code"], "VER");
        assert!(out["team"].as_str().unwrap().starts_with("Team"));
        assert!(out["career_starts"].as_u64().unwrap() >= 40);
    }

    #[tokio::test]
    async fn teammates_are_mutual() {
        let tool = DriverProfileTool;
        let a = tool.execute(json!({"driver": "VER"})).await.unwrap();
        let mate = a["teammate"].as_str().unwrap().to_string();
        let b = tool.execute(json!({"driver": mate})).await.unwrap();
        assert_eq!(b["teammate"], "VER");
    }
}
