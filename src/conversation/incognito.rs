//! Incognito chat: no account, no history, no memory, and a fixed number of
//! replies per connection.

use crate::llm::{ChatModel, Content};

use super::ConversationError;

/// Sent when generation fails in an incognito session.
pub const INCOGNITO_APOLOGY: &str = "Sorry, I'm having trouble processing your message right now.";
/// Sent once the quota is spent.
pub const LIMIT_MESSAGE: &str = "Login to continue chatting";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncognitoReply {
    Reply(String),
    LimitReached(&'static str),
}

/// Per-connection quota state.
#[derive(Debug)]
pub struct IncognitoSession {
    used: u32,
    quota: u32,
}

impl IncognitoSession {
    pub fn new(quota: u32) -> Self {
        Self { used: 0, quota }
    }

    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.used)
    }

    /// Answer `content` on its own. Only successful replies count against the quota.
    pub async fn respond(
        &mut self,
        model: &dyn ChatModel,
        content: &str,
    ) -> Result<IncognitoReply, ConversationError> {
        if self.remaining() == 0 {
            return Ok(IncognitoReply::LimitReached(LIMIT_MESSAGE));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        match model.generate(&[Content::user(content)]).await {
            Ok(reply) => {
                self.used += 1;
                tracing::info!(used = self.used, quota = self.quota, "incognito reply sent");
                Ok(IncognitoReply::Reply(reply))
            }
            Err(e) => {
                tracing::error!(error = %e, "incognito generation failed");
                Ok(IncognitoReply::Reply(INCOGNITO_APOLOGY.to_string()))
            }
        }
    }
}
