//! # Promptline Core
//!
//! Domain types, traits, and error definitions for the Promptline
//! prompt-assembly and streaming-response pipeline. This crate has no HTTP or
//! runtime dependencies; it defines the model the other crates build on.
//!
//! - [`ConversationTurn`] / [`Role`]: the inbound conversation
//! - [`PromptTemplate`] / [`PromptVariables`]: template binding and rendering
//! - [`GenerationBackend`]: the opaque "prompt in, fragments out" capability
//! - [`PipelineKind`]: the three fixed pipeline shapes and their templates

pub mod error;
pub mod message;
pub mod provider;
pub mod template;
pub mod variant;

// Re-export key types at crate root for ergonomics
pub use error::{BackendError, RequestError, TemplateError};
pub use message::{ChatRequest, ConversationTurn, Role};
pub use provider::{FragmentStream, GenerationBackend, GenerationConfig};
pub use template::{PromptTemplate, PromptVariables, RenderedPrompt};
pub use variant::PipelineKind;
