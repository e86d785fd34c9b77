//! Race report search over the hybrid index.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::search::SearchBackend;
use gridline_core::tool::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ReportSearchTool {
    index: Arc<dyn SearchBackend>,
}

impl ReportSearchTool {
    pub fn new(index: Arc<dyn SearchBackend>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for ReportSearchTool {
    fn name(&self) -> &str {
        "search_race_reports"
    }

    fn description(&self) -> &str {
        "Search race reports and articles for narrative context. Returns passages sorted by relevance."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for" },
                "limit": { "type": "integer", "description": "Maximum passages (default 3)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        let query = parameters["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidParameters {
                tool_name: self.name().into(),
                reason: "missing required key 'query'".into(),
            })?;
        let limit = parameters["limit"].as_u64().unwrap_or(3).min(10) as usize;

        let hits = self
            .index
            .hybrid_search(query, "race_reports", limit, None)
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;

        Ok(json!(hits
            .iter()
            .map(|h| json!({
                "content": h.content,
                "score": h.score,
                "metadata": h.metadata,
            }))
            .collect::<Vec<_>>()))
    }
}
