//! Vector store record types.

use serde::{Deserialize, Serialize};

/// What is stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub user_id: String,
    pub chat_id: String,
    /// The message text the vector was computed from.
    pub text: String,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryMatch {
    pub id: String,
    /// Cosine similarity, `1.0` for identical direction.
    pub score: f64,
    pub metadata: MemoryMetadata,
}

/// Restricts a query to one user and/or one chat. Empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
}

impl MemoryFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            chat_id: None,
        }
    }
}
