//! Configuration loading, validation, and management for gridline.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Validates all settings at startup. The backend list is
//! ordered: position in the list IS the fallback priority, and it never
//! changes at runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ordered LLM backend descriptors — first entry is tried first.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,

    /// Generation parameters shared across backends
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Pipeline hardening knobs
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Session store selection
    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            generation: GenerationConfig::default(),
            pipeline: PipelineConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// One LLM backend in the fallback chain.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name (e.g., "groq", "deepseek", "ollama")
    pub name: String,

    /// API key; falls back to the `<NAME>_API_KEY` environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Endpoint; defaults per well-known backend name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// The default ("capable") model for this backend
    pub model: String,

    /// Optional smaller model for fast-tier calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_model: Option<String>,
}

impl BackendConfig {
    /// The endpoint to use, applying well-known defaults.
    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| default_base_url(&self.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Lower temperature for fast-tier planning/classification calls
    #[serde(default = "default_fast_temperature")]
    pub fast_temperature: f32,

    /// Shorter budget for fast-tier calls
    #[serde(default = "default_fast_max_tokens")]
    pub fast_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            fast_temperature: default_fast_temperature(),
            fast_max_tokens: default_fast_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Re-plan rounds allowed before the engine forces generation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Deadline for one LLM call, per backend attempt
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    /// Deadline for one tool invocation
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Wall-clock budget for a whole user turn
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,

    /// Concurrency cap inside one execution wave
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,

    /// Whether to run the VALIDATE stage on generated answers
    #[serde(default = "default_true")]
    pub validate_answers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            turn_timeout_secs: default_turn_timeout(),
            max_concurrent_tools: default_max_concurrent_tools(),
            validate_answers: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "memory" or "file"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    /// Directory for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            path: None,
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_fast_temperature() -> f32 {
    0.3
}
fn default_fast_max_tokens() -> u32 {
    1024
}
fn default_max_iterations() -> u32 {
    2
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_turn_timeout() -> u64 {
    120
}
fn default_max_concurrent_tools() -> usize {
    8
}
fn default_true() -> bool {
    true
}
fn default_session_backend() -> String {
    "memory".into()
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            name: "groq".into(),
            api_key: None,
            base_url: None,
            model: "llama-3.3-70b-versatile".into(),
            fast_model: Some("llama-3.1-8b-instant".into()),
        },
        BackendConfig {
            name: "deepseek".into(),
            api_key: None,
            base_url: None,
            model: "deepseek-chat".into(),
            fast_model: None,
        },
        BackendConfig {
            name: "ollama".into(),
            api_key: None,
            base_url: None,
            model: "deepseek-r1:8b".into(),
            fast_model: None,
        },
    ]
}

/// Get the default base URL for well-known backends.
pub fn default_base_url(backend_name: &str) -> String {
    match backend_name {
        "groq" => "https://api.groq.com/openai/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{backend_name}.api.example.com/v1"),
    }
}

// Keys never appear in logs.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("backends", &self.backends)
            .field("generation", &self.generation)
            .field("pipeline", &self.pipeline)
            .field("session", &self.session)
            .finish()
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("fast_model", &self.fast_model)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides and
    /// validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build a config from defaults plus env overrides (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Fill missing API keys from `<NAME>_API_KEY` environment variables.
    pub fn apply_env_overrides(&mut self) {
        for backend in &mut self.backends {
            if backend.api_key.is_none() {
                let var = format!("{}_API_KEY", backend.name.to_uppercase());
                if let Ok(key) = std::env::var(&var) {
                    if !key.is_empty() {
                        tracing::debug!(backend = %backend.name, "API key loaded from environment");
                        backend.api_key = Some(key);
                    }
                }
            }
        }
    }

    /// Validate settings at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one backend must be configured".into(),
            ));
        }
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                return Err(ConfigError::Invalid("backend name cannot be empty".into()));
            }
            if backend.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "backend '{}' has no model configured",
                    backend.name
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature {} outside 0.0-2.0",
                self.generation.temperature
            )));
        }
        if self.pipeline.max_concurrent_tools == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_tools must be at least 1".into(),
            ));
        }
        if self.pipeline.turn_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "turn_timeout_secs must be at least 1".into(),
            ));
        }
        match self.session.backend.as_str() {
            "memory" | "file" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown session backend '{other}' (expected 'memory' or 'file')"
                )));
            }
        }
        Ok(())
    }
}
