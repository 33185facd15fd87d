//! Document store for accounts, chats, and chat messages.
//!
//! All functions are synchronous and take a borrowed [`rusqlite::Connection`];
//! async callers run them under `tokio::task::spawn_blocking`.

pub mod chats;
pub mod messages;
pub mod stats;
pub mod types;
pub mod users;

/// Fixed-width RFC 3339 timestamp so lexical order matches time order.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Time-sortable record id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
