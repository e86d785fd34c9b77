//! Error types for the gridline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all gridline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Search errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Every backend in the fallback chain failed. Terminal but expected:
    /// the pipeline turns this into a "temporarily unavailable" answer.
    #[error("All providers exhausted after {attempts} attempts, last error: {last_error}")]
    Exhausted {
        attempts: usize,
        last_error: String,
    },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool parameters for {tool_name}: {reason}")]
    InvalidParameters { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt session state: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Search backend error: {0}")]
    Backend(String),
}
