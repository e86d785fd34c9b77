//! Provider router — ordered fallback chain with fast/capable tiers.
//!
//! The chain order comes from configuration and never changes at runtime;
//! there is no health-based reordering. Every failure class falls through
//! to the next backend. The only same-backend retry is the narrow one
//! around the typed rate-limit signal.

use gridline_config::{AppConfig, GenerationConfig};
use gridline_core::error::ProviderError;
use gridline_core::message::Message;
use gridline_core::provider::{Provider, ProviderRequest, Tier};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts per backend when it reports a typed rate limit.
const RATE_LIMIT_ATTEMPTS: u32 = 3;

/// One backend in the chain: a provider plus its tier models.
struct RouterBackend {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    fast_model: Option<String>,
}

/// Routes LLM requests through the configured fallback chain.
pub struct ProviderRouter {
    backends: Vec<RouterBackend>,
    generation: GenerationConfig,
    call_timeout: Duration,
    retry_base: Duration,
    last_success: RwLock<Option<String>>,
}

impl ProviderRouter {
    /// Create a router with no backends.
    pub fn new(generation: GenerationConfig) -> Self {
        Self {
            backends: Vec::new(),
            generation,
            call_timeout: Duration::from_secs(60),
            retry_base: Duration::from_secs(1),
            last_success: RwLock::new(None),
        }
    }

    /// Append a backend to the chain. Position is priority.
    pub fn add_backend(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        fast_model: Option<String>,
    ) -> Self {
        self.backends.push(RouterBackend {
            name: name.into(),
            provider,
            model: model.into(),
            fast_model,
        });
        self
    }

    /// Set the per-attempt deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the base delay of the rate-limit backoff (doubles per attempt).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Number of backends in the chain.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Which backend served the most recent successful call, if any.
    pub fn last_successful_backend(&self) -> Option<String> {
        self.last_success.read().ok().and_then(|g| g.clone())
    }

    fn request_for(&self, backend: &RouterBackend, messages: &[Message], tier: Tier) -> ProviderRequest {
        // Fast tier falls back to the capable model when none is configured.
        let model = match tier {
            Tier::Fast => backend.fast_model.as_ref().unwrap_or(&backend.model),
            Tier::Capable => &backend.model,
        };
        let (temperature, max_tokens) = match tier {
            Tier::Fast => (
                self.generation.fast_temperature,
                self.generation.fast_max_tokens,
            ),
            Tier::Capable => (self.generation.temperature, self.generation.max_tokens),
        };
        ProviderRequest {
            model: model.clone(),
            messages: messages.to_vec(),
            temperature,
            max_tokens: Some(max_tokens),
        }
    }

    /// Generate a completion, walking the chain in priority order.
    ///
    /// Any failure advances to the next backend; the error text is scanned
    /// for rate/quota vocabulary purely to sharpen the log line. When the
    /// whole chain fails the caller gets `Exhausted`, not the last
    /// transport error bare.
    pub async fn generate(
        &self,
        messages: &[Message],
        tier: Tier,
    ) -> std::result::Result<String, ProviderError> {
        if self.backends.is_empty() {
            return Err(ProviderError::NotConfigured(
                "No backends in router chain".into(),
            ));
        }

        let mut last_error = ProviderError::NotConfigured("no attempt made".into());

        for (i, backend) in self.backends.iter().enumerate() {
            debug!(
                backend = %backend.name,
                attempt = i + 1,
                total = self.backends.len(),
                tier = %tier,
                "Router: trying backend"
            );

            match self.attempt_backend(backend, messages, tier).await {
                Ok(text) => {
                    if let Ok(mut guard) = self.last_success.write() {
                        *guard = Some(backend.name.clone());
                    }
                    info!(backend = %backend.name, tier = %tier, "Router: success");
                    return Ok(text);
                }
                Err(e) => {
                    if quota_vocabulary(&e) {
                        warn!(
                            backend = %backend.name,
                            error = %e,
                            "Router: backend failed (rate/quota hint), trying next"
                        );
                    } else {
                        warn!(
                            backend = %backend.name,
                            error = %e,
                            "Router: backend failed, trying next"
                        );
                    }
                    last_error = e;
                }
            }
        }

        Err(ProviderError::Exhausted {
            attempts: self.backends.len(),
            last_error: last_error.to_string(),
        })
    }

    /// One backend attempt, with the narrow rate-limit retry inside it.
    ///
    /// Only the typed `RateLimited` variant is retried (exponential
    /// backoff, fixed attempt cap); every other error — including a
    /// deadline expiry — returns immediately so the chain can advance.
    async fn attempt_backend(
        &self,
        backend: &RouterBackend,
        messages: &[Message],
        tier: Tier,
    ) -> std::result::Result<String, ProviderError> {
        let request = self.request_for(backend, messages, tier);
        let mut delay = self.retry_base;

        for attempt in 1..=RATE_LIMIT_ATTEMPTS {
            let result = tokio::time::timeout(
                self.call_timeout,
                backend.provider.complete(request.clone()),
            )
            .await;

            match result {
                Ok(Ok(response)) => return Ok(response.content),
                Ok(Err(ProviderError::RateLimited { retry_after_secs }))
                    if attempt < RATE_LIMIT_ATTEMPTS =>
                {
                    warn!(
                        backend = %backend.name,
                        attempt,
                        retry_after_secs,
                        backoff_ms = delay.as_millis() as u64,
                        "Router: rate limited, retrying same backend"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "Backend '{}' timed out after {}s",
                        backend.name,
                        self.call_timeout.as_secs()
                    )));
                }
            }
        }

        Err(ProviderError::RateLimited {
            retry_after_secs: 0,
        })
    }

    /// Two-stage convenience call: a fast-tier pass and a capable-tier pass
    /// issued concurrently, so the cheap pass never waits on the expensive
    /// one. Returns `(fast_result, capable_result)`.
    pub async fn two_stage(
        &self,
        fast_messages: &[Message],
        capable_messages: &[Message],
    ) -> std::result::Result<(String, String), ProviderError> {
        let (fast, capable) = tokio::join!(
            self.generate(fast_messages, Tier::Fast),
            self.generate(capable_messages, Tier::Capable),
        );
        Ok((fast?, capable?))
    }
}

/// Non-binding hint: does this error's description use rate-limit or quota
/// vocabulary? Used only to sharpen logging; never changes control flow.
fn quota_vocabulary(error: &ProviderError) -> bool {
    let text = error.to_string().to_lowercase();
    ["rate", "limit", "429", "quota", "exceeded"]
        .iter()
        .any(|word| text.contains(word))
}

/// Build a router from configuration: one OpenAI-compatible provider per
/// backend descriptor, in config order.
pub fn build_from_config(config: &AppConfig) -> std::result::Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(config.generation.clone())
        .with_call_timeout(Duration::from_secs(config.pipeline.llm_timeout_secs));

    for backend in &config.backends {
        let api_key = backend.api_key.clone().unwrap_or_default();
        let provider = Arc::new(crate::openai_compat::OpenAiCompatProvider::new(
            &backend.name,
            backend.endpoint(),
            api_key,
        )?);
        router = router.add_backend(
            &backend.name,
            provider,
            &backend.model,
            backend.fast_model.clone(),
        );
    }

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gridline_core::provider::ProviderResponse;
    use std::sync::Mutex;

    /// A mock provider that always fails with a fixed error.
    struct FailingProvider {
        name: String,
        error: ProviderError,
        call_count: Mutex<usize>,
    }

    impl FailingProvider {
        fn new(name: &str, error: ProviderError) -> Self {
            Self {
                name: name.into(),
                error,
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            Err(self.error.clone())
        }
    }

    /// A mock provider that succeeds and records the requested model.
    struct SuccessProvider {
        name: String,
        requested_models: Mutex<Vec<String>>,
    }

    impl SuccessProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                requested_models: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requested_models.lock().unwrap().len()
        }

        fn models(&self) -> Vec<String> {
            self.requested_models.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for SuccessProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            self.requested_models.lock().unwrap().push(request.model.clone());
            Ok(ProviderResponse {
                content: "success".into(),
                model: request.model,
                usage: None,
            })
        }
    }

    /// A mock provider that hangs forever (for timeout testing).
    struct HangingProvider;

    #[async_trait]
    impl Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!()
        }
    }

    fn fast_retry_router() -> ProviderRouter {
        ProviderRouter::new(GenerationConfig::default())
            .with_retry_base(Duration::from_millis(5))
    }

    fn ask() -> Vec<Message> {
        vec![Message::user("how consistent was VER?")]
    }

    #[tokio::test]
    async fn first_backend_succeeds() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = fast_retry_router()
            .add_backend("primary", p1.clone(), "big-model", None)
            .add_backend("secondary", p2.clone(), "other-model", None);

        let result = router.generate(&ask(), Tier::Capable).await.unwrap();
        assert_eq!(result, "success");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 0);
        assert_eq!(router.last_successful_backend().as_deref(), Some("primary"));
    }

    #[tokio::test]
    async fn falls_back_and_records_serving_backend() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 500,
                message: "Internal Server Error".into(),
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = fast_retry_router()
            .add_backend("primary", p1.clone(), "big-model", None)
            .add_backend("secondary", p2.clone(), "other-model", None);

        let result = router.generate(&ask(), Tier::Capable).await.unwrap();
        assert_eq!(result, "success");
        assert_eq!(p1.calls(), 1);
        assert_eq!(p2.calls(), 1);
        assert_eq!(
            router.last_successful_backend().as_deref(),
            Some("secondary")
        );
    }

    #[tokio::test]
    async fn all_backends_fail_yields_exhausted() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::Network("conn refused".into()),
        ));
        let p2 = Arc::new(FailingProvider::new(
            "secondary",
            ProviderError::AuthenticationFailed("bad key".into()),
        ));

        let router = fast_retry_router()
            .add_backend("primary", p1, "m1", None)
            .add_backend("secondary", p2, "m2", None);

        let err = router.generate(&ask(), Tier::Capable).await.unwrap_err();
        match err {
            ProviderError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("bad key"));
            }
            other => panic!("Expected Exhausted, got: {other:?}"),
        }
        assert!(router.last_successful_backend().is_none());
    }

    #[tokio::test]
    async fn rate_limit_retries_same_backend_then_falls_back() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::RateLimited {
                retry_after_secs: 0,
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = fast_retry_router()
            .add_backend("primary", p1.clone(), "m1", None)
            .add_backend("secondary", p2.clone(), "m2", None);

        let result = router.generate(&ask(), Tier::Capable).await.unwrap();
        assert_eq!(result, "success");
        // Rate-limited backend got the full retry budget before fallback
        assert_eq!(p1.calls(), RATE_LIMIT_ATTEMPTS as usize);
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn non_rate_limit_error_does_not_retry() {
        let p1 = Arc::new(FailingProvider::new(
            "primary",
            ProviderError::ApiError {
                status_code: 503,
                message: "rate limit exceeded".into(), // vocabulary only, not typed
            },
        ));
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = fast_retry_router()
            .add_backend("primary", p1.clone(), "m1", None)
            .add_backend("secondary", p2.clone(), "m2", None);

        router.generate(&ask(), Tier::Capable).await.unwrap();
        // Text-sniffed vocabulary is a logging hint, not a retry trigger
        assert_eq!(p1.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_advances_to_next_backend() {
        let p2 = Arc::new(SuccessProvider::new("secondary"));

        let router = fast_retry_router()
            .with_call_timeout(Duration::from_millis(50))
            .add_backend("hanging", Arc::new(HangingProvider), "m1", None)
            .add_backend("secondary", p2.clone(), "m2", None);

        let result = router.generate(&ask(), Tier::Capable).await.unwrap();
        assert_eq!(result, "success");
        assert_eq!(p2.calls(), 1);
    }

    #[tokio::test]
    async fn fast_tier_selects_fast_model() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let router = fast_retry_router().add_backend(
            "primary",
            p1.clone(),
            "big-model",
            Some("small-model".into()),
        );

        router.generate(&ask(), Tier::Fast).await.unwrap();
        router.generate(&ask(), Tier::Capable).await.unwrap();
        assert_eq!(p1.models(), vec!["small-model", "big-model"]);
    }

    #[tokio::test]
    async fn fast_tier_falls_back_to_capable_model() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let router = fast_retry_router().add_backend("primary", p1.clone(), "big-model", None);

        router.generate(&ask(), Tier::Fast).await.unwrap();
        assert_eq!(p1.models(), vec!["big-model"]);
    }

    #[tokio::test]
    async fn two_stage_returns_both_results() {
        let p1 = Arc::new(SuccessProvider::new("primary"));
        let router = fast_retry_router().add_backend(
            "primary",
            p1.clone(),
            "big-model",
            Some("small-model".into()),
        );

        let (fast, capable) = router
            .two_stage(&ask(), &[Message::user("full analysis please")])
            .await
            .unwrap();
        assert_eq!(fast, "success");
        assert_eq!(capable, "success");
        assert_eq!(p1.calls(), 2);
    }

    #[tokio::test]
    async fn empty_chain_is_not_configured() {
        let router = fast_retry_router();
        let err = router.generate(&ask(), Tier::Capable).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn quota_vocabulary_detection() {
        assert!(quota_vocabulary(&ProviderError::ApiError {
            status_code: 503,
            message: "quota exceeded for project".into(),
        }));
        assert!(!quota_vocabulary(&ProviderError::Network(
            "connection refused".into()
        )));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.len(), config.backends.len());
        assert!(!router.is_empty());
    }
}
