//! Builds the context for one chat turn from short-term memory (the chat's
//! newest messages) and long-term memory (similar past messages of the user).
//!
//! The assembled turn list is always `[long-term, short-term...]`. The client
//! shows `"..."` while a reply is pending; that placeholder is never replayed.

use std::collections::HashSet;

use super::types::MemoryMatch;
use crate::llm::{Content, TurnRole};
use crate::store::types::Message;

/// Text of the client's pending-reply bubble.
pub const LOADING_PLACEHOLDER: &str = "...";

/// Opening line of the long-term memory turn.
pub const LONG_TERM_PREAMBLE: &str =
    "these are some previous messages from the chat, use them to generate response";

/// True for text that carries nothing worth sending to the model.
pub fn is_placeholder(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == LOADING_PLACEHOLDER
}

/// Stored messages (oldest first) as model turns, placeholders dropped.
pub fn build_short_term(messages: &[Message]) -> Vec<Content> {
    messages
        .iter()
        .filter(|m| !is_placeholder(&m.content))
        .map(|m| Content::text(TurnRole::from(m.role), m.content.clone()))
        .collect()
}

/// Texts of the matches that make it into the long-term turn, best first.
///
/// Placeholders and repeated texts are skipped.
pub fn recalled_texts(matches: &[MemoryMatch]) -> Vec<&str> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .map(|m| m.metadata.text.as_str())
        .filter(|text| !is_placeholder(text))
        .filter(|text| seen.insert(*text))
        .collect()
}

/// A single user turn listing the [`recalled_texts`]. Returns `None` when
/// nothing is left.
pub fn build_long_term(matches: &[MemoryMatch]) -> Option<Content> {
    let recalled = recalled_texts(matches);
    if recalled.is_empty() {
        return None;
    }

    Some(Content::user(format!(
        "{LONG_TERM_PREAMBLE}\n\n{}",
        recalled.join("\n")
    )))
}

/// Long-term memory first, then the short-term history.
pub fn assemble(long_term: Option<Content>, short_term: Vec<Content>) -> Vec<Content> {
    long_term.into_iter().chain(short_term).collect()
}
