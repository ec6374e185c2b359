//! GenerationBackend trait — the abstraction over text-generation services.
//!
//! A backend takes a rendered prompt and returns a lazy, ordered, finite
//! sequence of text fragments. The sequence ends when generation completes;
//! an `Err` item means generation failed after it had started.
//!
//! Implementations: OpenAI-compatible endpoints (see `promptline-providers`).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::template::RenderedPrompt;

/// The fragment sequence returned by a backend.
///
/// Consumers pull fragments one at a time; dropping the stream abandons the
/// underlying generation.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Per-pipeline generation settings. Supplied once when a pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// The model to use (e.g., "gpt-3.5-turbo")
    pub model: String,

    /// Temperature (0.0 = near-deterministic, higher = more varied).
    /// Passed through unvalidated; range checks belong to the backend.
    pub temperature: f32,

    /// Whether to ask the backend for incremental output
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

fn default_streaming() -> bool {
    true
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            streaming: true,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

/// The core backend trait.
///
/// `generate` fails synchronously for errors detected before any output
/// (authentication, rejection, unreachable host). Failures after output has
/// started arrive as an `Err` item in the returned stream.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Start generating a response for `prompt`.
    async fn generate(
        &self,
        prompt: RenderedPrompt,
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError>;

    /// Whether the backend is reachable with the configured credential.
    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            prompt: RenderedPrompt,
            _config: &GenerationConfig,
        ) -> Result<FragmentStream, BackendError> {
            let words: Vec<Result<String, BackendError>> = prompt
                .as_str()
                .split_inclusive(' ')
                .map(|w| Ok(w.to_string()))
                .collect();
            Ok(Box::pin(futures::stream::iter(words)))
        }
    }

    #[tokio::test]
    async fn backend_streams_in_order() {
        let backend = EchoBackend;
        let config = GenerationConfig::new("echo-1", 0.0);
        let stream = backend
            .generate(RenderedPrompt::new("one two three"), &config)
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["one ", "two ", "three"]);
        assert!(backend.health_check().await.unwrap());
    }

    #[test]
    fn generation_config_defaults_to_streaming() {
        let config: GenerationConfig =
            serde_json::from_str(r#"{"model": "gpt-3.5-turbo", "temperature": 0.8}"#).unwrap();
        assert!(config.streaming);
        assert!(!config.with_streaming(false).streaming);
    }
}
