//! Pipeline orchestration.
//!
//! A [`Pipeline`] is built once per shape at startup and shared by every
//! request. It holds no per-request state, so concurrent requests never see
//! each other's turns, context, or output.
//!
//! # Flow
//!
//! 1. Received: the turns are split into history and final query
//! 2. ContextAssembled: template variables are built for the shape
//! 3. PromptRendered: the bound template is rendered
//! 4. Streaming: the backend has accepted the prompt
//! 5. Completed or Failed
//!
//! Every failure up to and including the backend call is returned from
//! [`Pipeline::run`] before any byte is produced. Failures after that point
//! surface inside the returned [`ResponseEncoder`].

use std::sync::Arc;

use promptline_core::message::{ConversationTurn, split_query};
use promptline_core::provider::{FragmentStream, GenerationBackend, GenerationConfig};
use promptline_core::template::{PromptTemplate, PromptVariables, RenderedPrompt};
use promptline_core::variant::{
    PipelineKind, VAR_CHAT_HISTORY, VAR_CONTEXT, VAR_INPUT, VAR_MESSAGE, VAR_QUESTION,
};
use tracing::{debug, info, warn};

use crate::context::format_history;
use crate::documents::DocumentSource;
use crate::encoder::{Framing, ResponseEncoder};
use crate::error::PipelineError;

/// Lifecycle of a single request through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    ContextAssembled,
    PromptRendered,
    Streaming,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::ContextAssembled => "context_assembled",
            Self::PromptRendered => "prompt_rendered",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Shape {
    Direct,
    History,
    Rag(Arc<DocumentSource>),
}

/// One configured pipeline: a shape, its bound template, and a backend.
pub struct Pipeline {
    shape: Shape,
    template: PromptTemplate,
    backend: Arc<dyn GenerationBackend>,
    generation: GenerationConfig,
}

impl Pipeline {
    /// Build a pipeline of the given shape with its built-in template.
    ///
    /// The RAG shape requires `documents`; the other shapes ignore it.
    pub fn new(
        kind: PipelineKind,
        backend: Arc<dyn GenerationBackend>,
        generation: GenerationConfig,
        documents: Option<Arc<DocumentSource>>,
    ) -> Result<Self, PipelineError> {
        let shape = match (kind, documents) {
            (PipelineKind::Direct, _) => Shape::Direct,
            (PipelineKind::History, _) => Shape::History,
            (PipelineKind::Rag, Some(documents)) => Shape::Rag(documents),
            (PipelineKind::Rag, None) => {
                return Err(PipelineError::Misconfigured(
                    "the rag pipeline needs a document source".into(),
                ));
            }
        };
        let template = PromptTemplate::bind(kind.as_str(), kind.default_template(), kind.variables())?;

        Ok(Self {
            shape,
            template,
            backend,
            generation,
        })
    }

    pub fn direct(
        backend: Arc<dyn GenerationBackend>,
        generation: GenerationConfig,
    ) -> Result<Self, PipelineError> {
        Self::new(PipelineKind::Direct, backend, generation, None)
    }

    pub fn history(
        backend: Arc<dyn GenerationBackend>,
        generation: GenerationConfig,
    ) -> Result<Self, PipelineError> {
        Self::new(PipelineKind::History, backend, generation, None)
    }

    pub fn rag(
        backend: Arc<dyn GenerationBackend>,
        generation: GenerationConfig,
        documents: Arc<DocumentSource>,
    ) -> Result<Self, PipelineError> {
        Self::new(PipelineKind::Rag, backend, generation, Some(documents))
    }

    /// Replace the built-in template. Fails if the template references a
    /// variable this shape does not supply.
    pub fn with_template(mut self, source: impl Into<String>) -> Result<Self, PipelineError> {
        let kind = self.kind();
        self.template = PromptTemplate::bind(kind.as_str(), source, kind.variables())?;
        Ok(self)
    }

    pub fn kind(&self) -> PipelineKind {
        match self.shape {
            Shape::Direct => PipelineKind::Direct,
            Shape::History => PipelineKind::History,
            Shape::Rag(_) => PipelineKind::Rag,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Build the template variables for `turns`.
    pub async fn assemble(&self, turns: &[ConversationTurn]) -> Result<PromptVariables, PipelineError> {
        let (history, query) = split_query(turns)?;

        let variables = match &self.shape {
            Shape::Direct => PromptVariables::new().with(VAR_MESSAGE, &query.content),
            Shape::History => PromptVariables::new()
                .with(VAR_CHAT_HISTORY, format_history(history))
                .with(VAR_INPUT, &query.content),
            Shape::Rag(documents) => {
                let context = documents.context().await?;
                debug!(origin = documents.origin(), chars = context.len(), "Corpus context attached");
                PromptVariables::new()
                    .with(VAR_CONTEXT, &*context)
                    .with(VAR_CHAT_HISTORY, format_history(history))
                    .with(VAR_QUESTION, &query.content)
            }
        };

        self.transition(PipelineState::ContextAssembled);
        Ok(variables)
    }

    /// Assemble and render the prompt for `turns` without calling the backend.
    pub async fn render(&self, turns: &[ConversationTurn]) -> Result<RenderedPrompt, PipelineError> {
        let variables = self.assemble(turns).await?;
        let prompt = self.template.render(&variables)?;
        debug!(pipeline = %self.kind(), chars = prompt.len(), "Prompt rendered");
        self.transition(PipelineState::PromptRendered);
        Ok(prompt)
    }

    /// Run a request and return the encoded response stream.
    pub async fn run(
        &self,
        turns: &[ConversationTurn],
        framing: Framing,
    ) -> Result<ResponseEncoder, PipelineError> {
        let kind = self.kind();
        self.transition(PipelineState::Received);
        info!(
            pipeline = %kind,
            turns = turns.len(),
            model = %self.generation.model,
            "Pipeline request received"
        );

        match self.start(turns).await {
            Ok(fragments) => {
                self.transition(PipelineState::Streaming);
                Ok(ResponseEncoder::new(fragments, framing).for_pipeline(kind))
            }
            Err(e) => {
                warn!(pipeline = %kind, status = e.status(), error = %e, "Pipeline failed before streaming");
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn start(&self, turns: &[ConversationTurn]) -> Result<FragmentStream, PipelineError> {
        let prompt = self.render(turns).await?;
        let fragments = self.backend.generate(prompt, &self.generation).await?;
        Ok(fragments)
    }

    fn transition(&self, state: PipelineState) {
        debug!(pipeline = %self.kind(), state = %state, "Pipeline state");
    }
}
