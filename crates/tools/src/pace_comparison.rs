//! Head-to-head pace comparison computed store-side.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::tool::Tool;
use serde_json::{json, Value};

use crate::synthetic;

pub struct PaceComparisonTool;

#[async_trait]
impl Tool for PaceComparisonTool {
    fn name(&self) -> &str {
        "compare_driver_pace"
    }

    fn description(&self) -> &str {
        "Compare average race pace between two drivers in one session. Returns per-driver averages and the delta."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "driver_a": { "type": "string", "description": "First driver code" },
                "driver_b": { "type": "string", "description": "Second driver code" },
                "season": { "type": "integer" },
                "event": { "type": "string" }
            },
            "required": ["driver_a", "driver_b"]
        })
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let invalid = |key: &str| ToolError::InvalidParameters {
            tool_name: "compare_driver_pace".into(),
            reason: format!("missing required key '{key}'"),
        };
        let driver_a = parameters["driver_a"]
            .as_str()
            .ok_or_else(|| invalid("driver_a"))?
            .to_uppercase();
        let driver_b = parameters["driver_b"]
            .as_str()
            .ok_or_else(|| invalid("driver_b"))?
            .to_uppercase();

        let pace_a = synthetic::base_pace(&driver_a) + 1.3; // race average sits above baseline
        let pace_b = synthetic::base_pace(&driver_b) + 1.3;

        Ok(json!({
            "driver_a": driver_a,
            "driver_b": driver_b,
            "driver_a_avg_pace": (pace_a * 1000.0).round() / 1000.0,
            "driver_b_avg_pace": (pace_b * 1000.0).round() / 1000.0,
            "pace_delta": ((pace_b - pace_a) * 1000.0).round() / 1000.0,
            "laps_compared": 52,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delta_is_antisymmetric() {
        let tool = PaceComparisonTool;
        let ab = tool
            .execute(json!({"driver_a": "VER", "driver_b": "NOR"}))
            .await
            .unwrap();
        let ba = tool
            .execute(json!({"driver_a": "NOR", "driver_b": "VER"}))
            .await
            .unwrap();
        let d1 = ab["pace_delta"].as_f64().unwrap();
        let d2 = ba["pace_delta"].as_f64().unwrap();
        assert!((d1 + d2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn requires_both_drivers() {
        let tool = PaceComparisonTool;
        assert!(tool.execute(json!({"driver_a": "VER"})).await.is_err());
    }
}
