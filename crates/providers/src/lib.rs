//! LLM provider implementations for gridline.
//!
//! - `openai_compat` — any endpoint exposing `/v1/chat/completions`
//!   (Groq, DeepSeek, OpenAI, OpenRouter, Together, Ollama, vLLM)
//! - `router` — the ordered fallback chain with fast/capable tiers

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, ProviderRouter};
