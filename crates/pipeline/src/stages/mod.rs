//! Pipeline stage implementations.
//!
//! Each stage takes the mutable pipeline state (plus its collaborators) and
//! advances it; none of them fail the turn — degradation is always local.

pub mod enrich;
pub mod generate;
pub mod plan;
pub mod process;
pub mod understand;
pub mod validate;
