//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a
//! completion back. The router layers tier selection and failover on top;
//! a single provider only ever handles one call to one endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Which quality/latency tier a call should run on.
///
/// "Fast" backs cheap preliminary passes (intent extraction, validation);
/// "capable" backs planning and final answer generation. A backend with no
/// fast model configured serves both tiers with its capable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Capable,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Fast => write!(f, "fast"),
            Tier::Capable => write!(f, "capable"),
        }
    }
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "llama-3.3-70b-versatile")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The router calls `complete()`
/// without knowing which backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "groq", "deepseek").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}
