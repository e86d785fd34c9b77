//! Tool execution engine — dependency-wave scheduling with containment.
//!
//! The plan's parallel groups and `depends_on` edges are combined into one
//! dependency graph: every member of group N+1 depends on every member of
//! group N (preserving the cross-group completion guarantee), and explicit
//! `depends_on` edges are added on top. Execution proceeds by repeated
//! frontier extraction; a declared group whose members depend on each other
//! is a planning defect that the waves simply split.
//!
//! Guarantees:
//! - Total coverage: every tool-call id in the plan gets exactly one entry
//!   in the result map, even when tools fail.
//! - Containment: a failing, unknown, rejected, or timed-out call becomes
//!   an `{error: ...}` marker; nothing aborts the plan.
//! - Bounded fan-out: concurrent calls inside one wave are capped.

use futures::future::join_all;
use gridline_core::plan::{ExecutionPlan, ToolCall};
use gridline_core::state::ToolOutcome;
use gridline_core::tool::ToolRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub struct ToolExecutionEngine {
    tool_timeout: Duration,
    max_concurrent: usize,
}

impl ToolExecutionEngine {
    pub fn new() -> Self {
        Self {
            tool_timeout: Duration::from_secs(30),
            max_concurrent: 8,
        }
    }

    /// Set the per-call deadline.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the concurrency cap inside one wave.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Run a plan to completion against the registry.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        registry: &ToolRegistry,
    ) -> BTreeMap<String, ToolOutcome> {
        // First occurrence wins when a plan carries duplicate ids.
        let mut calls: HashMap<&str, &ToolCall> = HashMap::new();
        for tc in &plan.tool_calls {
            calls.entry(tc.id.as_str()).or_insert(tc);
        }

        // Resolve grouped ids: unknown ids and repeat memberships are
        // planning defects, skipped silently.
        let mut scheduled: Vec<&str> = Vec::new();
        let mut group_of: HashMap<&str, usize> = HashMap::new();
        for (gi, group) in plan.parallel_groups.iter().enumerate() {
            for id in group {
                if !calls.contains_key(id.as_str()) {
                    debug!(call_id = %id, "Skipping unknown id in parallel group");
                    continue;
                }
                if group_of.contains_key(id.as_str()) {
                    continue;
                }
                group_of.insert(id.as_str(), gi);
                scheduled.push(id.as_str());
            }
        }

        // Flag declared groups that hide a dependency edge between members.
        for id in &scheduled {
            for dep in &calls[id].depends_on {
                if dep.as_str() != *id && group_of.get(dep.as_str()) == Some(&group_of[id]) {
                    warn!(
                        call_id = %id,
                        depends_on = %dep,
                        group = group_of[id],
                        "Parallel group contains a dependency edge; waves will split it"
                    );
                }
            }
        }

        // Predecessors: all members of earlier groups, plus explicit edges.
        let preds: HashMap<&str, HashSet<&str>> = scheduled
            .iter()
            .map(|id| {
                let gi = group_of[id];
                let mut p: HashSet<&str> = scheduled
                    .iter()
                    .filter(|other| group_of[*other] < gi)
                    .copied()
                    .collect();
                for dep in &calls[id].depends_on {
                    if dep.as_str() != *id && group_of.contains_key(dep.as_str()) {
                        p.insert(dep.as_str());
                    }
                }
                (*id, p)
            })
            .collect();

        let mut results: BTreeMap<String, ToolOutcome> = BTreeMap::new();
        let mut completed: HashSet<&str> = HashSet::new();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        // Waves by frontier extraction.
        let mut wave = 0usize;
        loop {
            let frontier: Vec<&str> = scheduled
                .iter()
                .filter(|id| {
                    !completed.contains(*id) && preds[*id].iter().all(|p| completed.contains(p))
                })
                .copied()
                .collect();
            if frontier.is_empty() {
                break;
            }
            wave += 1;
            debug!(wave, size = frontier.len(), "Executing wave");

            let outcomes = join_all(frontier.iter().map(|id| {
                let sem = semaphore.clone();
                let tc = calls[*id];
                async move {
                    let _permit = sem.acquire().await.ok();
                    (*id, self.invoke(tc, registry).await)
                }
            }))
            .await;

            for (id, outcome) in outcomes {
                results.insert(id.to_string(), outcome);
                completed.insert(id);
            }
        }

        // Whatever the frontier never reached is stuck in a cycle — another
        // planning defect. Run those sequentially rather than dropping them.
        for id in &scheduled {
            if !completed.contains(id) {
                warn!(call_id = %id, "Dependency cycle in plan, executing sequentially");
                let outcome = self.invoke(calls[id], registry).await;
                results.insert((*id).to_string(), outcome);
                completed.insert(*id);
            }
        }

        // Calls absent from every group run sequentially, in plan order.
        for tc in &plan.tool_calls {
            if completed.contains(tc.id.as_str()) {
                continue;
            }
            debug!(call_id = %tc.id, tool = %tc.tool_name, "Executing sequential call");
            let outcome = self.invoke(tc, registry).await;
            results.insert(tc.id.clone(), outcome);
            completed.insert(tc.id.as_str());
        }

        info!(calls = results.len(), waves = wave, "Plan execution complete");
        results
    }

    /// Invoke one call with full containment: rejection, unknown tool,
    /// failure, and timeout all become error markers.
    async fn invoke(&self, tc: &ToolCall, registry: &ToolRegistry) -> ToolOutcome {
        if let Some(reason) = &tc.invalid {
            return ToolOutcome::failure(format!("rejected at planning: {reason}"));
        }

        let Some(tool) = registry.get(&tc.tool_name) else {
            return ToolOutcome::failure(format!("unknown tool: {}", tc.tool_name));
        };

        let params = Value::Object(tc.parameters.clone());
        match tokio::time::timeout(self.tool_timeout, tool.execute(params)).await {
            Ok(Ok(value)) => ToolOutcome::success(value),
            Ok(Err(e)) => {
                warn!(call_id = %tc.id, tool = %tc.tool_name, error = %e, "Tool call failed");
                ToolOutcome::failure(e.to_string())
            }
            Err(_) => {
                warn!(
                    call_id = %tc.id,
                    tool = %tc.tool_name,
                    timeout_secs = self.tool_timeout.as_secs(),
                    "Tool call timed out"
                );
                ToolOutcome::failure(format!(
                    "tool '{}' timed out after {}s",
                    tc.tool_name,
                    self.tool_timeout.as_secs()
                ))
            }
        }
    }
}

impl Default for ToolExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
