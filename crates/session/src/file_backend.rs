//! File-backed session store — one JSON document per session id.
//!
//! Saves go through a temp file plus rename so a crash mid-write never
//! leaves a truncated snapshot behind.

use async_trait::async_trait;
use gridline_core::error::SessionError;
use gridline_core::session::SessionStore;
use gridline_core::state::PipelineState;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SessionError::Storage(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session ids come from the transport layer; keep only characters
        // that are safe as a file name.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, session_id: &str) -> Result<Option<PipelineState>, SessionError> {
        let path = self.path_for(session_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SessionError::Storage(format!(
                    "read {}: {e}",
                    path.display()
                )));
            }
        };
        let state = serde_json::from_str(&raw)
            .map_err(|e| SessionError::Corrupt(format!("{}: {e}", path.display())))?;
        Ok(Some(state))
    }

    async fn save(&self, session_id: &str, state: &PipelineState) -> Result<(), SessionError> {
        let path = self.path_for(session_id);
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| SessionError::Storage(format!("serialize: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| SessionError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SessionError::Storage(format!("rename {}: {e}", path.display())))?;

        debug!(session_id, path = %path.display(), "Session saved");
        Ok(())
    }
}

impl FileSessionStore {
    /// List the session ids currently on disk.
    pub async fn list(&self) -> Result<Vec<String>, SessionError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::Storage(e.to_string()))?
        {
            let name = entry.file_name();
            let name = Path::new(&name);
            if name.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = name.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        assert!(store.load("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        let mut state = PipelineState::new("race-chat-1");
        state.begin_turn("compare VER and NOR");
        store.save("race-chat-1", &state).await.unwrap();

        let loaded = store.load("race-chat-1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "race-chat-1");
        assert_eq!(loaded.current_query(), "compare VER and NOR");
    }

    #[tokio::test]
    async fn unsafe_ids_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        let state = PipelineState::new("../../etc/passwd");
        store.save("../../etc/passwd", &state).await.unwrap();

        // The snapshot landed inside the store directory
        let ids = store.list().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(!ids[0].contains('/'));
    }

    #[tokio::test]
    async fn corrupt_snapshot_reports_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();

        tokio::fs::write(dir.path().join("bad.json"), "{not json")
            .await
            .unwrap();
        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, SessionError::Corrupt(_)));
    }

    #[tokio::test]
    async fn list_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).await.unwrap();
        store.save("b", &PipelineState::new("b")).await.unwrap();
        store.save("a", &PipelineState::new("a")).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);
    }
}
