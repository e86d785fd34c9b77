//! Shared mocks for stage unit tests.

use async_trait::async_trait;
use gridline_config::GenerationConfig;
use gridline_core::error::ProviderError;
use gridline_core::provider::{Provider, ProviderRequest, ProviderResponse};
use gridline_providers::ProviderRouter;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed queue of responses and records every request.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    pub requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(content) => Ok(ProviderResponse {
                content,
                model: request.model,
                usage: None,
            }),
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            }),
        }
    }
}

/// A router backed by one scripted provider.
pub fn scripted_router(responses: Vec<&str>) -> ProviderRouter {
    ProviderRouter::new(GenerationConfig::default())
        .with_retry_base(Duration::from_millis(5))
        .add_backend(
            "scripted",
            Arc::new(ScriptedProvider::new(responses)),
            "test-capable",
            Some("test-fast".into()),
        )
}

struct AlwaysFailing;

#[async_trait]
impl Provider for AlwaysFailing {
    fn name(&self) -> &str {
        "down"
    }

    async fn complete(
        &self,
        _request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// A router whose single backend always fails.
pub fn failing_router() -> ProviderRouter {
    ProviderRouter::new(GenerationConfig::default())
        .with_retry_base(Duration::from_millis(5))
        .add_backend("down", Arc::new(AlwaysFailing), "test-capable", None)
}
