//! Configuration loading, validation, and management for Promptline.
//!
//! Loads configuration from `~/.promptline/config.toml` (or an explicit path)
//! with environment variable overrides. Validates all settings at startup,
//! including any template overrides, so a template that references a
//! variable its pipeline does not supply is rejected before serving.

use promptline_core::{GenerationConfig, PipelineKind, PromptTemplate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Framing names accepted in `[gateway] framing`.
pub const FRAMINGS: [&str; 2] = ["data_stream", "text"];
/// Reload policies accepted in `[corpus] reload`.
pub const RELOAD_POLICIES: [&str; 2] = ["per_request", "cached"];

/// The root configuration structure.
///
/// Maps directly to `~/.promptline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Backend provider name (openai, openrouter, ollama, ...)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Backend transport configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Document corpus for the retrieval-augmented pipeline
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Per-pipeline generation settings
    #[serde(default)]
    pub pipelines: PipelinesConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("gateway", &self.gateway)
            .field("backend", &self.backend)
            .field("corpus", &self.corpus)
            .field("pipelines", &self.pipelines)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body size
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Response framing: "data_stream" or "text"
    #[serde(default = "default_framing")]
    pub framing: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    3000
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_framing() -> String {
    "data_stream".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            framing: default_framing(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Whole-request timeout for backend HTTP calls
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fragments buffered between the backend reader and the consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_channel_capacity() -> usize {
    16
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JSON file holding the documents
    #[serde(default = "default_corpus_path")]
    pub path: PathBuf,

    /// JSON Pointer selecting the subtree to extract documents from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,

    /// "per_request" re-reads the file on every request; "cached" reads it once
    #[serde(default = "default_reload")]
    pub reload: String,
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("data/qa.json")
}
fn default_reload() -> String {
    "per_request".into()
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
            pointer: None,
            reload: default_reload(),
        }
    }
}

/// Generation settings for one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Falls back to the pipeline's own default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default = "default_true")]
    pub streaming: bool,

    /// Replaces the built-in template; must only use the pipeline's variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: None,
            streaming: true,
            template: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve the backend settings for `kind`.
    pub fn generation_config(&self, kind: PipelineKind) -> GenerationConfig {
        GenerationConfig::new(
            self.model.clone(),
            self.temperature.unwrap_or_else(|| kind.default_temperature()),
        )
        .with_streaming(self.streaming)
    }

    /// The template text for `kind`: the override if set, else the built-in.
    pub fn template_source(&self, kind: PipelineKind) -> &str {
        self.template
            .as_deref()
            .unwrap_or_else(|| kind.default_template())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinesConfig {
    #[serde(default)]
    pub direct: PipelineConfig,

    #[serde(default)]
    pub history: PipelineConfig,

    #[serde(default)]
    pub rag: PipelineConfig,
}

impl PipelinesConfig {
    pub fn get(&self, kind: PipelineKind) -> &PipelineConfig {
        match kind {
            PipelineKind::Direct => &self.direct,
            PipelineKind::History => &self.history,
            PipelineKind::Rag => &self.rag,
        }
    }

    pub fn get_mut(&mut self, kind: PipelineKind) -> &mut PipelineConfig {
        match kind {
            PipelineKind::Direct => &mut self.direct,
            PipelineKind::History => &mut self.history,
            PipelineKind::Rag => &mut self.rag,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default path
    /// (~/.promptline/config.toml) when `None`.
    ///
    /// Environment variables override file values:
    /// - `PROMPTLINE_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `PROMPTLINE_PROVIDER`
    /// - `PROMPTLINE_MODEL` (applies to every pipeline)
    /// - `PROMPTLINE_CORPUS_PATH`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PROMPTLINE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("PROMPTLINE_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("PROMPTLINE_MODEL") {
            for kind in PipelineKind::ALL {
                self.pipelines.get_mut(kind).model = model.clone();
            }
        }

        if let Some(path) = lookup("PROMPTLINE_CORPUS_PATH") {
            self.corpus.path = PathBuf::from(path);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptline")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in PipelineKind::ALL {
            let pipeline = self.pipelines.get(kind);

            if let Some(t) = pipeline.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::ValidationError(format!(
                        "pipelines.{kind}.temperature must be between 0.0 and 2.0"
                    )));
                }
            }

            if pipeline.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "pipelines.{kind}.model must not be empty"
                )));
            }

            PromptTemplate::bind(
                kind.as_str(),
                pipeline.template_source(kind),
                kind.variables(),
            )
            .map_err(|e| ConfigError::ValidationError(format!("pipelines.{kind}.template: {e}")))?;
        }

        if self.backend.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "backend.channel_capacity must be at least 1".into(),
            ));
        }

        if !FRAMINGS.contains(&self.gateway.framing.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "gateway.framing must be one of {FRAMINGS:?}, got '{}'",
                self.gateway.framing
            )));
        }

        if !RELOAD_POLICIES.contains(&self.corpus.reload.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "corpus.reload must be one of {RELOAD_POLICIES:?}, got '{}'",
                self.corpus.reload
            )));
        }

        Ok(())
    }

    /// Check if a credential is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            gateway: GatewayConfig::default(),
            backend: BackendConfig::default(),
            corpus: CorpusConfig::default(),
            pipelines: PipelinesConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
