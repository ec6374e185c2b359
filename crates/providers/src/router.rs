//! Backend selection: builds the configured generation backend.
//!
//! Every supported provider speaks the OpenAI-compatible protocol, so
//! selection is a matter of resolving the base URL and credential.

use std::sync::Arc;
use std::time::Duration;

use promptline_config::AppConfig;
use promptline_core::provider::GenerationBackend;
use tracing::{info, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Providers that run locally and accept any credential.
const KEYLESS_PROVIDERS: [&str; 4] = ["ollama", "vllm", "llamacpp", "llama.cpp"];

/// Build the backend described by `config`.
///
/// A missing credential is logged rather than rejected: the backend reports
/// the authentication failure on first use, which keeps `serve` usable
/// against local endpoints that ignore keys.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn GenerationBackend> {
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    let api_key = match (&config.api_key, KEYLESS_PROVIDERS.contains(&config.provider.as_str())) {
        (Some(key), _) => key.clone(),
        (None, true) => config.provider.clone(),
        (None, false) => {
            warn!(provider = %config.provider, "No API key configured; backend calls will fail authentication");
            String::new()
        }
    };

    info!(provider = %config.provider, base_url = %base_url, "Generation backend configured");

    Arc::new(
        OpenAiCompatProvider::new(&config.provider, base_url, api_key)
            .with_timeout(Duration::from_secs(config.backend.timeout_secs))
            .with_channel_capacity(config.backend.channel_capacity),
    )
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let backend = build_from_config(&config);
        assert_eq!(backend.name(), "openai");
    }

    #[test]
    fn build_local_provider_without_key() {
        let config = AppConfig {
            provider: "ollama".into(),
            ..AppConfig::default()
        };
        let backend = build_from_config(&config);
        assert_eq!(backend.name(), "ollama");
    }
}
