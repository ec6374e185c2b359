//! Generation backend implementations for Promptline.
//!
//! All backends implement the `promptline_core::GenerationBackend` trait.
//! [`build_from_config`] selects and constructs the configured one.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
