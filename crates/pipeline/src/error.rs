//! Request-level pipeline errors.
//!
//! Every failure a request can hit is folded into [`PipelineError`], which
//! also carries the status classification used by the transport.

use std::path::PathBuf;

use promptline_core::error::{BackendError, RequestError, TemplateError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Failed to load document corpus: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Template defect: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Pipeline misconfigured: {0}")]
    Misconfigured(String),
}

impl PipelineError {
    /// HTTP status for this failure when it happens before streaming starts.
    pub fn status(&self) -> u16 {
        match self {
            Self::Request(_) => 400,
            Self::Backend(e) => e.status_code(),
            Self::Corpus(_) | Self::Template(_) | Self::Misconfigured(_) => 500,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CorpusError {
    #[error("could not read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("could not parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}
