//! Document corpus for the retrieval-augmented pipeline.
//!
//! The corpus is a JSON file. Every string leaf in the document (or in the
//! subtree selected by a JSON Pointer) becomes one document, in document
//! order. Documents are joined with a blank line into a single context block.
//!
//! There is no relevance ranking: the whole corpus is supplied on every
//! request. Non-string leaves (numbers, booleans, null) are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::CorpusError;

/// Separator between documents in the assembled context.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// When the corpus file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Re-read on every request; edits to the file show up immediately.
    #[default]
    PerRequest,
    /// Read once when the source is opened.
    Cached,
}

impl ReloadPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PerRequest => "per_request",
            Self::Cached => "cached",
        }
    }
}

impl std::str::FromStr for ReloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per_request" => Ok(Self::PerRequest),
            "cached" => Ok(Self::Cached),
            other => Err(format!(
                "Unknown reload policy '{other}'. Use 'per_request' or 'cached'."
            )),
        }
    }
}

#[derive(Debug)]
enum Corpus {
    Loaded(Arc<str>),
    File {
        path: PathBuf,
        pointer: Option<String>,
    },
}

/// Where the RAG pipeline gets its context from.
#[derive(Debug)]
pub struct DocumentSource {
    corpus: Corpus,
    origin: String,
}

impl DocumentSource {
    /// Open a JSON corpus file.
    ///
    /// With [`ReloadPolicy::Cached`] the file is read here and a missing or
    /// malformed file fails immediately. With [`ReloadPolicy::PerRequest`]
    /// nothing is read until the first request.
    pub async fn open(
        path: impl Into<PathBuf>,
        pointer: Option<String>,
        policy: ReloadPolicy,
    ) -> Result<Self, CorpusError> {
        let path = path.into();
        let origin = path.display().to_string();

        let corpus = match policy {
            ReloadPolicy::PerRequest => Corpus::File { path, pointer },
            ReloadPolicy::Cached => {
                let documents = load_documents(&path, pointer.as_deref()).await?;
                info!(path = %origin, documents = documents.len(), "Document corpus cached");
                Corpus::Loaded(Arc::from(format_documents(&documents)))
            }
        };

        Ok(Self { corpus, origin })
    }

    /// A fixed in-memory corpus.
    pub fn from_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let documents: Vec<String> = documents.into_iter().map(Into::into).collect();
        Self {
            corpus: Corpus::Loaded(Arc::from(format_documents(&documents))),
            origin: "inline".into(),
        }
    }

    /// The effective reload policy.
    pub fn policy(&self) -> ReloadPolicy {
        match self.corpus {
            Corpus::Loaded(_) => ReloadPolicy::Cached,
            Corpus::File { .. } => ReloadPolicy::PerRequest,
        }
    }

    /// Where the documents come from, for logs.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The assembled context block.
    pub async fn context(&self) -> Result<Arc<str>, CorpusError> {
        match &self.corpus {
            Corpus::Loaded(text) => Ok(Arc::clone(text)),
            Corpus::File { path, pointer } => {
                let documents = load_documents(path, pointer.as_deref()).await?;
                debug!(path = %self.origin, documents = documents.len(), "Document corpus loaded");
                Ok(Arc::from(format_documents(&documents)))
            }
        }
    }
}

/// Read a corpus file and extract its documents.
pub async fn load_documents(path: &Path, pointer: Option<&str>) -> Result<Vec<String>, CorpusError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CorpusError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let parse_error = |reason: String| CorpusError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let root: Value = serde_json::from_str(&raw).map_err(|e| parse_error(e.to_string()))?;
    let selected = match pointer {
        Some(p) => root
            .pointer(p)
            .ok_or_else(|| parse_error(format!("pointer '{p}' matches nothing")))?,
        None => &root,
    };

    Ok(extract_documents(selected))
}

/// Collect every string leaf under `value`, depth-first in document order.
pub fn extract_documents(value: &Value) -> Vec<String> {
    let mut documents = Vec::new();
    collect_strings(value, &mut documents);
    documents
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Join documents into one context block.
pub fn format_documents(documents: &[String]) -> String {
    documents.join(DOCUMENT_SEPARATOR)
}
