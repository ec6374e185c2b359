//! Conversation history formatting.
//!
//! Each prior turn renders as `"<role>: <content>"`; turns are joined by a
//! single newline in their original order. Content is inserted verbatim.

use promptline_core::message::ConversationTurn;

/// Render a single turn.
pub fn format_turn(turn: &ConversationTurn) -> String {
    format!("{}: {}", turn.role, turn.content)
}

/// Render prior turns as one context block. No turns yields `""`.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns.iter().map(format_turn).collect::<Vec<_>>().join("\n")
}
