//! Execution plan types — the output of the PLAN stage.
//!
//! A plan is a set of tool calls plus a partial order expressed as parallel
//! groups. Planning defects (dangling ids, unknown tools, bad parameters)
//! are data, not panics: they are recorded on the plan and tolerated by the
//! execution engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use crate::tool::ToolRegistry;

/// A single planned tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier within one plan (e.g., "laps_VER")
    pub id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Parameters to pass to the tool
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,

    /// IDs of tool calls this depends on
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Why this tool is being called
    #[serde(default)]
    pub purpose: String,

    /// Set at plan-construction time when the call cannot be executed
    /// (unknown tool, schema-invalid parameters). EXECUTE turns such calls
    /// directly into error markers without touching a backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            parameters: serde_json::Map::new(),
            depends_on: Vec::new(),
            purpose: String::new(),
            invalid: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    pub fn depending_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

/// The execution plan for one retrieval round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// List of tools to call
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Groups of tool-call ids that may run concurrently. Groups execute in
    /// list order; ids absent from every group run sequentially afterwards.
    #[serde(default)]
    pub parallel_groups: Vec<Vec<String>>,

    /// Expected number of records the plan should retrieve
    #[serde(default)]
    pub expected_records: u32,

    /// Explanation of why these tools were chosen
    #[serde(default)]
    pub reasoning: String,
}

impl ExecutionPlan {
    /// Look up a call by id.
    pub fn call(&self, id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|tc| tc.id == id)
    }

    /// Ids that appear in the call list but in no parallel group,
    /// in plan order.
    pub fn ungrouped_ids(&self) -> Vec<&str> {
        let grouped: HashSet<&str> = self
            .parallel_groups
            .iter()
            .flatten()
            .map(|s| s.as_str())
            .collect();
        self.tool_calls
            .iter()
            .filter(|tc| !grouped.contains(tc.id.as_str()))
            .map(|tc| tc.id.as_str())
            .collect()
    }

    /// Validate every call against the registry, marking calls that name an
    /// unknown tool or carry schema-invalid parameters. Returns how many
    /// calls were marked invalid.
    pub fn validate(&mut self, registry: &ToolRegistry) -> usize {
        let mut marked = 0;
        for tc in &mut self.tool_calls {
            if let Err(reason) = registry.check_call(&tc.tool_name, &tc.parameters) {
                tracing::warn!(
                    call_id = %tc.id,
                    tool = %tc.tool_name,
                    reason = %reason,
                    "Planned call rejected at construction time"
                );
                tc.invalid = Some(reason);
                marked += 1;
            }
        }
        marked
    }

    /// Ids referenced by groups or `depends_on` that name no call in the
    /// plan. These are planning defects the engine skips silently.
    pub fn dangling_ids(&self) -> Vec<&str> {
        let known: HashSet<&str> = self.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
        let mut dangling = Vec::new();
        for id in self.parallel_groups.iter().flatten() {
            if !known.contains(id.as_str()) {
                dangling.push(id.as_str());
            }
        }
        for tc in &self.tool_calls {
            for dep in &tc.depends_on {
                if !known.contains(dep.as_str()) {
                    dangling.push(dep.as_str());
                }
            }
        }
        dangling
    }
}
