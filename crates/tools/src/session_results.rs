//! Session classification — final order, gaps, and points.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::tool::Tool;
use serde_json::{json, Value};

use crate::synthetic;

const POINTS: [u32; 10] = [25, 18, 15, 12, 10, 8, 6, 4, 2, 1];

pub struct SessionResultsTool;

#[async_trait]
impl Tool for SessionResultsTool {
    fn name(&self) -> &str {
        "get_session_results"
    }

    fn description(&self) -> &str {
        "Fetch the final classification of a session: position, driver, team, total time gap, and points."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "season": {
                    "type": "integer",
                    "description": "Season year, e.g. 2025"
                },
                "event": {
                    "type": "string",
                    "description": "Event name, e.g. 'Monza'"
                }
            },
            "required": ["season"]
        })
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let season = parameters["season"]
            .as_i64()
            .ok_or_else(|| ToolError::InvalidParameters {
                tool_name: self.name().into(),
                reason: "missing required key 'season'".into(),
            })?;
        let event = parameters["event"].as_str().unwrap_or("Season Opener");

        // Classification order: baseline pace decides, salted by the event
        // so different weekends produce different podiums.
        let mut order: Vec<&str> = synthetic::GRID.to_vec();
        order.sort_by(|a, b| {
            let ka = synthetic::base_pace(a) + (synthetic::seed(&format!("{event}{season}{a}")) % 40) as f64 / 10.0;
            let kb = synthetic::base_pace(b) + (synthetic::seed(&format!("{event}{season}{b}")) % 40) as f64 / 10.0;
            ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let rows: Vec<Value> = order
            .iter()
            .enumerate()
            .map(|(i, driver)| {
                let position = i as u32 + 1;
                json!({
                    "position": position,
                    "driver": driver,
                    "gap_seconds": if i == 0 { 0.0 } else { (i as f64) * 3.2 + (synthetic::seed(driver) % 20) as f64 / 10.0 },
                    "points": POINTS.get(i).copied().unwrap_or(0),
                    "status": "Finished",
                })
            })
            .collect();

        tracing::debug!(season, event = %event, rows = rows.len(), "Session results retrieved");
        Ok(Value::Array(rows))
    }
}
