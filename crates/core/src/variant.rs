//! The three pipeline shapes.
//!
//! Each shape owns a fixed set of template variables and a built-in template.
//! The variable set is what a template (built-in or configured) is bound
//! against when the pipeline is constructed.

use serde::{Deserialize, Serialize};

/// Variable bound to the final turn in the direct pipeline.
pub const VAR_MESSAGE: &str = "message";
/// Variable bound to the formatted prior turns.
pub const VAR_CHAT_HISTORY: &str = "chat_history";
/// Variable bound to the final turn in the history-aware pipeline.
pub const VAR_INPUT: &str = "input";
/// Variable bound to the final turn in the retrieval-augmented pipeline.
pub const VAR_QUESTION: &str = "question";
/// Variable bound to the flattened document corpus.
pub const VAR_CONTEXT: &str = "context";

const DIRECT_TEMPLATE: &str = "{message}";

const HISTORY_TEMPLATE: &str = "\
You are a grumpy old pirate who has been shaped by long seasons of adventure \
at sea. Answer questions in the most world-weary and sarcastic manner you can. \
Always keep the answer concise. Ask the user questions when you need more context.

Current conversation:
{chat_history}

user: {input}
assistant:";

const RAG_TEMPLATE: &str = "\
Answer the user's questions based only on the following context. If the \
question is out of context, reply politely that you don't have the information available.:
===================================
Context: {context}
===================================
Current conversation: {chat_history}

user: {question}
assistant:";

/// Which pipeline shape a request runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Final turn only, passed straight through.
    Direct,
    /// Prior turns as history plus the final turn.
    History,
    /// Document corpus plus history plus the final turn.
    Rag,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [Self::Direct, Self::History, Self::Rag];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::History => "history",
            Self::Rag => "rag",
        }
    }

    /// Variables this shape supplies to its template.
    pub fn variables(&self) -> &'static [&'static str] {
        match self {
            Self::Direct => &[VAR_MESSAGE],
            Self::History => &[VAR_CHAT_HISTORY, VAR_INPUT],
            Self::Rag => &[VAR_CONTEXT, VAR_CHAT_HISTORY, VAR_QUESTION],
        }
    }

    /// The built-in template text.
    pub fn default_template(&self) -> &'static str {
        match self {
            Self::Direct => DIRECT_TEMPLATE,
            Self::History => HISTORY_TEMPLATE,
            Self::Rag => RAG_TEMPLATE,
        }
    }

    /// Default sampling temperature. Grounded answers run deterministic.
    pub fn default_temperature(&self) -> f32 {
        match self {
            Self::Direct | Self::History => 0.8,
            Self::Rag => 0.0,
        }
    }

    /// Whether this shape needs a document corpus.
    pub fn uses_corpus(&self) -> bool {
        matches!(self, Self::Rag)
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "history" => Ok(Self::History),
            "rag" => Ok(Self::Rag),
            other => Err(format!(
                "Unknown pipeline '{other}'. Use 'direct', 'history', or 'rag'."
            )),
        }
    }
}
