//! Language-model plumbing: the turn format, the [`ChatModel`] and [`Embedder`]
//! traits, and the Gemini implementation of both.
//!
//! Generation and embedding are network calls, so both traits are async. The
//! server holds them as `Arc<dyn ...>` so tests can swap in scripted fakes.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::store::types::Role;

/// Shown to the user when the provider reports it is overloaded (HTTP 503).
pub const OVERLOADED_REPLY: &str = "AI is overloaded right now, try again later.";
/// Shown to the user for any other generation failure.
pub const FAILURE_REPLY: &str = "Something went wrong while generating content.";

/// Speaker of a turn, as the provider names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl From<Role> for TurnRole {
    /// The provider only knows two speakers; system notes are replayed as user turns.
    fn from(role: Role) -> Self {
        match role {
            Role::Model => Self::Model,
            Role::User | Role::System => Self::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One turn of the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: TurnRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(TurnRole::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text(TurnRole::Model, text)
    }

    /// All parts concatenated.
    pub fn joined_text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("LLM provider is overloaded")]
    Overloaded,

    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM response contained no {0}")]
    EmptyResponse(&'static str),

    #[error("expected a {expected}-dimensional embedding, got {actual}")]
    Dimensions { expected: usize, actual: usize },
}

/// Text to show the user in place of a reply that could not be generated.
pub fn fallback_reply(err: &LlmError) -> &'static str {
    match err {
        LlmError::Overloaded => OVERLOADED_REPLY,
        _ => FAILURE_REPLY,
    }
}

/// Generates the next model turn for a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, contents: &[Content]) -> Result<String, LlmError>;
}

/// Turns text into a fixed-size vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Number of dimensions every returned vector has.
    fn dimensions(&self) -> usize;
}
