#![allow(dead_code)]

use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use weirwood::config::MemoryConfig;
use weirwood::conversation::ChatService;
use weirwood::db;
use weirwood::llm::{ChatModel, Content, Embedder, LlmError};
use weirwood::store::types::{Chat, NewUser, User};

pub const DIMENSIONS: usize = 8;

/// Words that each light up one embedding dimension.
const TOPICS: [&str; 7] = ["cricket", "biryani", "guitar", "monsoon", "exam", "train", "movie"];

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(db::open_memory_database(DIMENSIONS).unwrap()))
}

/// Deterministic embedding: one dimension per topic word mentioned, plus a
/// small constant so that no vector is all zeros.
pub fn topic_embedding(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v = vec![0.0f32; DIMENSIONS];
    for (i, topic) in TOPICS.iter().enumerate() {
        if lower.contains(topic) {
            v[i] = 1.0;
        }
    }
    v[DIMENSIONS - 1] = 0.1;
    v
}

/// Embedder backed by [`topic_embedding`] that can be told to fail.
#[derive(Default)]
pub struct TopicEmbedder {
    pub fail: AtomicBool,
}

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Overloaded);
        }
        Ok(topic_embedding(text))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Chat model that replays queued outcomes and records every context it saw.
/// Once the queue is empty it answers `"reply N"`.
#[derive(Default)]
pub struct ScriptedModel {
    outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
    pub contexts: Mutex<Vec<Vec<Content>>>,
}

impl ScriptedModel {
    pub fn push(&self, outcome: Result<String, LlmError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn last_context(&self) -> Vec<Content> {
        self.contexts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
        let n = {
            let mut contexts = self.contexts.lock().unwrap();
            contexts.push(contents.to_vec());
            contexts.len()
        };
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(format!("reply {n}")),
        }
    }
}

pub struct Harness {
    pub db: Arc<Mutex<Connection>>,
    pub model: Arc<ScriptedModel>,
    pub embedder: Arc<TopicEmbedder>,
    pub service: ChatService,
}

pub fn harness(short_term_limit: usize, long_term_limit: usize) -> Harness {
    let db = test_db();
    let model = Arc::new(ScriptedModel::default());
    let embedder = Arc::new(TopicEmbedder::default());
    let service = ChatService::new(
        Arc::clone(&db),
        model.clone(),
        embedder.clone(),
        MemoryConfig {
            short_term_limit,
            long_term_limit,
        },
    );
    Harness {
        db,
        model,
        embedder,
        service,
    }
}

pub fn seed_user(db: &Arc<Mutex<Connection>>, email: &str) -> User {
    let mut conn = db.lock().unwrap();
    weirwood::store::users::create_user(
        &mut conn,
        &NewUser {
            email,
            first_name: "Test",
            last_name: "User",
            password_hash: "not-a-real-hash",
        },
    )
    .unwrap()
}

pub fn seed_chat(db: &Arc<Mutex<Connection>>, user: &User, title: &str) -> Chat {
    let conn = db.lock().unwrap();
    weirwood::store::chats::create_chat(&conn, &user.id, title).unwrap()
}

pub fn memory_count(db: &Arc<Mutex<Connection>>) -> u64 {
    let conn = db.lock().unwrap();
    weirwood::memory::store::memory_count(&conn).unwrap()
}

pub fn message_count(db: &Arc<Mutex<Connection>>, chat_id: &str) -> usize {
    let conn = db.lock().unwrap();
    weirwood::store::messages::list_messages(&conn, chat_id)
        .unwrap()
        .len()
}
