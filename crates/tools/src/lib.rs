//! Data-source tool implementations for gridline.
//!
//! Tools give the pipeline access to the three external store families:
//! - Telemetry store: lap times, session results, stints, pace comparison
//! - Relationship graph: driver profiles, race weekend facts
//! - Hybrid search index: race reports, regulations
//!
//! All backends here are deterministic stubs (the real stores are external
//! collaborators), matching the shapes the pipeline aggregates over.

pub mod driver_profile;
pub mod lap_times;
pub mod pace_comparison;
pub mod race_weekend;
pub mod regulation_search;
pub mod report_search;
pub mod search_index;
pub mod session_results;
pub mod stint_summary;
pub mod synthetic;

use gridline_core::search::SearchBackend;
use gridline_core::tool::ToolRegistry;
use std::sync::Arc;

pub use search_index::StaticSearchIndex;

/// Create the default tool registry with all built-in tools, wiring the
/// search tools to the given index.
pub fn registry_with_search(index: Arc<dyn SearchBackend>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(lap_times::LapTimesTool));
    registry.register(Box::new(session_results::SessionResultsTool));
    registry.register(Box::new(stint_summary::StintSummaryTool));
    registry.register(Box::new(pace_comparison::PaceComparisonTool));
    registry.register(Box::new(driver_profile::DriverProfileTool));
    registry.register(Box::new(race_weekend::RaceWeekendTool));
    registry.register(Box::new(report_search::ReportSearchTool::new(index.clone())));
    registry.register(Box::new(regulation_search::RegulationSearchTool::new(index)));
    registry
}

/// Create the default tool registry backed by the static search index.
pub fn default_registry() -> ToolRegistry {
    registry_with_search(Arc::new(StaticSearchIndex::new()))
}
