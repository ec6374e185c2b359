//! `promptline render` — Print the prompt a pipeline would send.
//!
//! Runs context assembly and template rendering only. The backend is never
//! called, so this works without a credential.

use std::path::Path;
use std::sync::Arc;

use promptline_core::error::RequestError;
use promptline_core::message::{ChatRequest, ConversationTurn};
use promptline_core::variant::PipelineKind;
use promptline_pipeline::{DocumentSource, ReloadPolicy};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    kind: PipelineKind,
    messages: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let turns = parse_messages(messages)?;

    let documents = if kind.uses_corpus() {
        let source = DocumentSource::open(
            &config.corpus.path,
            config.corpus.pointer.clone(),
            ReloadPolicy::PerRequest,
        )
        .await?;
        Some(Arc::new(source))
    } else {
        None
    };

    let backend = promptline_providers::build_from_config(&config);
    let pipeline = promptline_gateway::pipeline_from_config(&config, kind, backend, documents)?;
    let prompt = pipeline.render(&turns).await?;
    tracing::debug!(pipeline = %kind, bytes = prompt.len(), "Rendered prompt");

    println!("{prompt}");
    Ok(())
}

/// Accept either a bare array of turns or a full `{"messages": [...]}` body.
pub fn parse_messages(raw: &str) -> Result<Vec<ConversationTurn>, RequestError> {
    let body = if raw.trim_start().starts_with('[') {
        format!(r#"{{"messages": {raw}}}"#)
    } else {
        raw.to_string()
    };
    ChatRequest::from_slice(body.as_bytes())?.into_turns()
}
