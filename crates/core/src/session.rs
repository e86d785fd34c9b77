//! Session persistence contract.
//!
//! State is read once at turn start and written once at turn end; the
//! pipeline assumes at most one in-flight turn per session id, so no
//! finer-grained locking is part of this contract.

use async_trait::async_trait;
use crate::error::SessionError;
use crate::state::PipelineState;

/// Load/save boundary for per-session pipeline state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Load the stored state for a session. `None` means the session has no
    /// history yet and the caller should start fresh.
    async fn load(
        &self,
        session_id: &str,
    ) -> std::result::Result<Option<PipelineState>, SessionError>;

    /// Persist the state for a session, replacing any previous snapshot.
    async fn save(
        &self,
        session_id: &str,
        state: &PipelineState,
    ) -> std::result::Result<(), SessionError>;
}
