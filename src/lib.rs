//! Conversational chat server with short-term and long-term memory.
//!
//! Weirwood serves a chat frontend over HTTP and a WebSocket. Each turn the
//! model sees two kinds of memory:
//!
//! | Memory | Source | Scope |
//! |--------|--------|-------|
//! | **Short-term** | Newest messages of the chat, verbatim | One chat |
//! | **Long-term** | Past messages nearest to the new one by embedding | All chats of the user |
//!
//! Visitors without an account can open an incognito connection: no history,
//! no memory, nothing stored, and a fixed number of replies.
//!
//! # Architecture
//!
//! - **Storage**: SQLite for users, chats, and messages, with
//!   [sqlite-vec](https://github.com/asg017/sqlite-vec) holding message embeddings
//! - **Model**: Gemini over REST for both generation and embeddings
//! - **Transport**: axum HTTP endpoints plus a JSON-framed WebSocket
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`store`]: Users, chats, and messages
//! - [`llm`]: Turn format, model traits, and the Gemini client
//! - [`memory`]: Vector store and context assembly
//! - [`conversation`]: The chat turn and incognito sessions
//! - [`auth`]: Password hashing, session tokens, cookies
//! - [`server`]: HTTP routes and the chat socket

pub mod auth;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod llm;
pub mod memory;
pub mod server;
pub mod store;
