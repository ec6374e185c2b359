//! The prompt-assembly and streaming-response pipeline.
//!
//! A request flows through a fixed sequence of stages:
//!
//! 1. **Split** the turns into history and the final query
//! 2. **Assemble context**: format history, and for the RAG shape load the corpus
//! 3. **Render** the pipeline's template with the assembled variables
//! 4. **Generate**: start the backend and receive a lazy fragment stream
//! 5. **Encode**: frame each fragment for transport as it arrives
//!
//! The three shapes (direct, history, rag) share this sequence and differ
//! only in which context is built, the template, and the variable names.

pub mod context;
pub mod documents;
pub mod encoder;
pub mod error;
pub mod orchestrator;

pub use context::{format_history, format_turn};
pub use documents::{DocumentSource, ReloadPolicy};
pub use encoder::{Framing, ResponseEncoder};
pub use error::{CorpusError, PipelineError};
pub use orchestrator::{Pipeline, PipelineState};

#[cfg(test)]
pub(crate) mod test_helpers;
