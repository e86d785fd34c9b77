//! Session state persistence backends for gridline.
//!
//! The pipeline reads state once at turn start and writes once at turn
//! end; these backends implement that contract in memory or on disk.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileSessionStore;
pub use in_memory::InMemorySessionStore;

use gridline_core::error::SessionError;
use gridline_core::session::SessionStore;
use std::path::Path;
use std::sync::Arc;

/// Build a session store from the configured backend name ("memory" or
/// "file"). The file backend requires a directory path.
pub async fn store_for_backend(
    backend: &str,
    path: Option<&Path>,
) -> Result<Arc<dyn SessionStore>, SessionError> {
    match backend {
        "memory" => Ok(Arc::new(InMemorySessionStore::new())),
        "file" => {
            let dir = path.ok_or_else(|| {
                SessionError::Storage("file session backend requires a path".into())
            })?;
            Ok(Arc::new(FileSessionStore::new(dir).await?))
        }
        other => Err(SessionError::Storage(format!(
            "unknown session backend '{other}'"
        ))),
    }
}
