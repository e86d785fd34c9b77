//! Tool trait — the abstraction over retrieval capabilities.
//!
//! Tools are what let the pipeline reach the external data sources:
//! the telemetry store, the graph store, and the hybrid search index.
//! A tool must never panic past its own boundary; failures come back as
//! `ToolError` and the execution engine converts them to error markers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use crate::error::ToolError;

/// A tool's advertised interface, used to build the planner's tool catalog
/// and to validate planned calls before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The tool name
    pub name: String,

    /// Description of what the tool does (shown to the planner LLM)
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Each tool (lap times, session results, graph lookups, report search...)
/// implements this trait and is registered in the ToolRegistry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_lap_times").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the planner LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, parameters: Value) -> std::result::Result<Value, ToolError>;

    /// Convert this tool into a ToolSpec.
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The pipeline uses this to:
/// 1. Build the tool catalog the planner chooses from
/// 2. Validate planned calls at plan-construction time
/// 3. Look up and execute tools during the EXECUTE stage
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool specs (for the planner's catalog).
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Check a planned call against the named tool's declared schema.
    ///
    /// Returns the reason a call is invalid: unknown tool, missing required
    /// key, or a provided value whose type contradicts the schema. Used at
    /// plan-construction time so planning defects never reach a backend.
    pub fn check_call(
        &self,
        tool_name: &str,
        parameters: &serde_json::Map<String, Value>,
    ) -> std::result::Result<(), String> {
        let Some(tool) = self.get(tool_name) else {
            return Err(format!("unknown tool: {tool_name}"));
        };
        check_parameters(&tool.parameters_schema(), parameters)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a parameter map against a JSON Schema object.
///
/// Deliberately shallow: required keys must be present, and provided values
/// must match the declared primitive type. Nested object schemas are not
/// descended into; the callee still owns deep validation.
pub fn check_parameters(
    schema: &Value,
    parameters: &serde_json::Map<String, Value>,
) -> std::result::Result<(), String> {
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !parameters.contains_key(key) {
                return Err(format!("missing required key '{key}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (key, value) in parameters {
        let Some(declared) = properties.get(key).and_then(|p| p.get("type")) else {
            continue;
        };
        let Some(expected) = declared.as_str() else {
            continue;
        };
        let ok = match expected {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !ok {
            return Err(format!("key '{key}' should be of type {expected}"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "repeat": { "type": "integer" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, parameters: Value) -> std::result::Result<Value, ToolError> {
            Ok(json!({ "echoed": parameters["text"] }))
        }
    }

    fn params(v: Value) -> serde_json::Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_specs_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
    }

    #[test]
    fn check_call_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.check_call("missing", &params(json!({}))).unwrap_err();
        assert!(err.contains("unknown tool"));
    }

    #[test]
    fn check_call_missing_required_key() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry.check_call("echo", &params(json!({}))).unwrap_err();
        assert!(err.contains("text"));
    }

    #[test]
    fn check_call_wrong_type() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let err = registry
            .check_call("echo", &params(json!({"text": "hi", "repeat": "three"})))
            .unwrap_err();
        assert!(err.contains("repeat"));
    }

    #[test]
    fn check_call_valid() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry
            .check_call("echo", &params(json!({"text": "hi", "repeat": 3})))
            .is_ok());
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        // The callee owns deep validation; extra keys pass the shallow check.
        let schema = json!({"type": "object", "properties": {}, "required": []});
        assert!(check_parameters(&schema, &params(json!({"extra": true}))).is_ok());
    }

    #[tokio::test]
    async fn tool_executes() {
        let tool = EchoTool;
        let out = tool.execute(json!({"text": "hello"})).await.unwrap();
        assert_eq!(out["echoed"], "hello");
    }
}
