//! One chat turn, end to end.
//!
//! [`ChatService::respond`] runs the read side of a turn: persist and embed the
//! user's message, recall similar past messages, load the recent history,
//! assemble the context, and generate. [`ChatService::remember_reply`] runs the
//! write side once the reply has reached the client.
//!
//! Long-term recall happens before the new message's vector is stored, so a
//! message never recalls itself.

pub mod incognito;

use anyhow::anyhow;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::config::MemoryConfig;
use crate::llm::{fallback_reply, ChatModel, Embedder, LlmError};
use crate::memory::context::{assemble, build_long_term, build_short_term, recalled_texts};
use crate::memory::search::query_memory;
use crate::memory::store::upsert_memory;
use crate::memory::types::{MemoryFilter, MemoryMetadata};
use crate::store::chats::{find_owned_chat, touch_chat};
use crate::store::messages::{insert_message, recent_messages};
use crate::store::types::{Role, User};

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("chat not found: {0}")]
    ChatNotFound(String),

    #[error("embedding failed: {0}")]
    Embedding(#[source] LlmError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The outcome of [`ChatService::respond`].
#[derive(Debug, Clone)]
pub struct Turn {
    pub chat_id: String,
    pub reply: String,
    /// True when `reply` is a canned fallback rather than model output.
    pub fallback: bool,
    /// Number of long-term memories injected into the context.
    pub recalled: usize,
}

#[derive(Clone)]
pub struct ChatService {
    db: Arc<Mutex<Connection>>,
    model: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    memory: MemoryConfig,
}

impl ChatService {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        model: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            db,
            model,
            embedder,
            memory,
        }
    }

    pub fn model(&self) -> Arc<dyn ChatModel> {
        Arc::clone(&self.model)
    }

    /// Run `f` against the shared connection on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow!("db task failed: {e}"))?
    }

    /// Build the context for `content` in `chat_id` and generate a reply.
    ///
    /// Generation failures become a fallback reply; embedding and storage
    /// failures abort the turn.
    pub async fn respond(
        &self,
        user: &User,
        chat_id: &str,
        content: &str,
    ) -> Result<Turn, ConversationError> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let (user_id, chat) = (user.id.clone(), chat_id.to_string());
        let owned = self
            .with_db(move |conn| find_owned_chat(conn, &chat, &user_id))
            .await?;
        if owned.is_none() {
            return Err(ConversationError::ChatNotFound(chat_id.to_string()));
        }

        tracing::info!(user = %user.id, chat = %chat_id, content_len = content.len(), "chat turn started");

        // 1. Persist the user's message while embedding it.
        let (user_id, chat, text) = (user.id.clone(), chat_id.to_string(), content.clone());
        let (stored, embedded) = tokio::join!(
            self.with_db(move |conn| insert_message(conn, Some(&user_id), &chat, &text, Role::User)),
            self.embedder.embed(&content),
        );
        let message = stored?;
        let vector = embedded.map_err(ConversationError::Embedding)?;

        // 2. Recall before this message's own vector is stored.
        let (query_vector, filter, limit) = (
            vector.clone(),
            MemoryFilter::for_user(user.id.clone()),
            self.memory.long_term_limit,
        );
        let recalled = self
            .with_db(move |conn| query_memory(conn, &query_vector, limit, &filter))
            .await?;

        // 3. Store the vector while loading the recent history.
        let metadata = MemoryMetadata {
            user_id: user.id.clone(),
            chat_id: chat_id.to_string(),
            text: content.clone(),
        };
        let message_id = message.id.clone();
        let (chat, stm_limit) = (chat_id.to_string(), self.memory.short_term_limit);
        let (upserted, history) = tokio::join!(
            self.with_db(move |conn| upsert_memory(conn, &message_id, &vector, &metadata)),
            self.with_db(move |conn| recent_messages(conn, &chat, stm_limit)),
        );
        upserted?;
        let history = history?;

        // 4. Assemble and generate.
        let injected = recalled_texts(&recalled).len();
        let context = assemble(build_long_term(&recalled), build_short_term(&history));
        tracing::debug!(
            chat = %chat_id,
            long_term = injected,
            short_term = history.len(),
            turns = context.len(),
            "context assembled"
        );

        let (reply, fallback) = match self.model.generate(&context).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::error!(chat = %chat_id, error = %e, "generation failed, sending fallback");
                (fallback_reply(&e).to_string(), true)
            }
        };

        Ok(Turn {
            chat_id: chat_id.to_string(),
            reply,
            fallback,
            recalled: injected,
        })
    }

    /// Persist the reply as a model message and, unless it is a fallback,
    /// store its vector under the message id.
    ///
    /// The reply has already been delivered, so a failed embedding only
    /// skips the vector.
    pub async fn remember_reply(&self, user: &User, turn: &Turn) -> Result<(), ConversationError> {
        let vector = if turn.fallback {
            None
        } else {
            match self.embedder.embed(&turn.reply).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    tracing::warn!(chat = %turn.chat_id, error = %e, "reply embedding failed, saving without a vector");
                    None
                }
            }
        };

        let (user_id, chat_id, reply) = (user.id.clone(), turn.chat_id.clone(), turn.reply.clone());
        let message_id = self
            .with_db(move |conn| {
                let message = insert_message(conn, Some(&user_id), &chat_id, &reply, Role::Model)?;
                if let Some(vector) = vector {
                    let metadata = MemoryMetadata {
                        user_id,
                        chat_id: chat_id.clone(),
                        text: reply,
                    };
                    upsert_memory(conn, &message.id, &vector, &metadata)?;
                }
                touch_chat(conn, &chat_id)?;
                Ok(message.id)
            })
            .await?;

        tracing::info!(chat = %turn.chat_id, message = %message_id, "reply remembered");
        Ok(())
    }
}
