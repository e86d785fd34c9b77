//! Sporting regulation search over the hybrid index.

use async_trait::async_trait;
use gridline_core::error::ToolError;
use gridline_core::search::SearchBackend;
use gridline_core::tool::Tool;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct RegulationSearchTool {
    index: Arc<dyn SearchBackend>,
}

impl RegulationSearchTool {
    pub fn new(index: Arc<dyn SearchBackend>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for RegulationSearchTool {
    fn name(&self) -> &str {
        "search_regulations"
    }

    fn description(&self) -> &str {
        "Search the sporting regulations for rules relevant to incidents and penalties. Returns articles sorted by relevance."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Rule topic, e.g. 'causing a collision'" },
                "limit": { "type": "integer", "description": "Maximum articles (default 2)" }
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
        let limit = parameters["limit"].as_u64().unwrap_or(2).min(5) as usize;

        let hits = self
            .index
            .hybrid_search(query, "regulations", limit, None)
            .await
            .map_err(|e| ToolError::Backend(e.to_string()))?;

        Ok(json!(hits
            .iter()
            .map(|h| json!({
                "content": h.content,
                "article": h.metadata.get("article").cloned().unwrap_or(Value::Null),
                "score": h.score,
            }))
            .collect::<Vec<_>>()))
    }
}
