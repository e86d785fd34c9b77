//! OpenAI-compatible provider implementation.
//!
//! Works with: Groq, DeepSeek, OpenAI, OpenRouter, Together AI, Ollama,
//! vLLM, and any endpoint exposing `/v1/chat/completions`.
//!
//! Error mapping is typed so the router can react precisely: HTTP 429
//! becomes `RateLimited` (the one signal that triggers same-backend
//! retry), 401/403 become `AuthenticationFailed`, anything else non-200
//! becomes `ApiError`.

use async_trait::async_trait;
use gridline_core::error::ProviderError;
use gridline_core::message::{Message, Role};
use gridline_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create a Groq provider (convenience constructor).
    pub fn groq(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("groq", "https://api.groq.com/openai/v1", api_key)
    }

    /// Create a DeepSeek provider (convenience constructor).
    pub fn deepseek(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("deepseek", "https://api.deepseek.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Convert our Message types to the wire format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            usage,
        })
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
