//! In-memory session store — useful for testing and ephemeral deployments.

use async_trait::async_trait;
use gridline_core::error::SessionError;
use gridline_core::session::SessionStore;
use gridline_core::state::PipelineState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Stores session snapshots in a map. Nothing survives process restart.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, PipelineState>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, session_id: &str) -> Result<Option<PipelineState>, SessionError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn save(&self, session_id: &str, state: &PipelineState) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_session_is_none() {
        let store = InMemorySessionStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let store = InMemorySessionStore::new();
        let mut state = PipelineState::new("s1");
        state.begin_turn("how was VER's pace?");

        store.save("s1", &state).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "s1");
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn save_replaces_previous_snapshot() {
        let store = InMemorySessionStore::new();
        let mut state = PipelineState::new("s1");
        state.begin_turn("first");
        store.save("s1", &state).await.unwrap();

        state.begin_turn("second");
        store.save("s1", &state).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(store.count().await, 1);
    }
}
