//! Conversation turn types and inbound request parsing.
//!
//! A request carries an ordered list of turns, oldest first. The last turn is
//! the one that needs an answer; everything before it is history.

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// The inbound chat request body: `{"messages": [{role, content}, ...]}`.
///
/// Unknown fields on the body or on individual messages are ignored so that
/// clients sending richer message objects (ids, timestamps) are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<ConversationTurn>>,
}

impl ChatRequest {
    /// Parse a raw JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()))
    }

    /// Take the turns out of the request, rejecting a missing or empty list.
    pub fn into_turns(self) -> Result<Vec<ConversationTurn>, RequestError> {
        match self.messages {
            None => Err(RequestError::MissingMessages),
            Some(turns) if turns.is_empty() => Err(RequestError::EmptyMessages),
            Some(turns) => Ok(turns),
        }
    }
}

/// Split turns into `(history, query)` where `query` is the final turn.
pub fn split_query(
    turns: &[ConversationTurn],
) -> Result<(&[ConversationTurn], &ConversationTurn), RequestError> {
    turns
        .split_last()
        .map(|(query, history)| (history, query))
        .ok_or(RequestError::EmptyMessages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_with_extra_fields() {
        let body = br#"{
            "messages": [
                {"id": "a1", "role": "user", "content": "hi", "createdAt": "2024-01-01"},
                {"role": "assistant", "content": "hello"}
            ],
            "data": {}
        }"#;
        let turns = ChatRequest::from_slice(body).unwrap().into_turns().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], ConversationTurn::user("hi"));
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn empty_messages_rejected() {
        let req = ChatRequest::from_slice(br#"{"messages": []}"#).unwrap();
        assert_eq!(req.into_turns(), Err(RequestError::EmptyMessages));
    }

    #[test]
    fn missing_messages_rejected() {
        let req = ChatRequest::from_slice(br#"{}"#).unwrap();
        assert_eq!(req.into_turns(), Err(RequestError::MissingMessages));
    }

    #[test]
    fn unknown_role_is_invalid_body() {
        let err = ChatRequest::from_slice(br#"{"messages": [{"role": "robot", "content": "x"}]}"#)
            .unwrap_err();
        assert!(matches!(err, RequestError::InvalidBody(_)));
    }

    #[test]
    fn split_query_takes_last_turn() {
        let turns = vec![
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
            ConversationTurn::user("how are you"),
        ];
        let (history, query) = split_query(&turns).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(query.content, "how are you");
    }

    #[test]
    fn split_query_on_empty_fails() {
        assert_eq!(split_query(&[]).unwrap_err(), RequestError::EmptyMessages);
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
    }
}
