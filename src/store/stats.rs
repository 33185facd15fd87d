use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub users: u64,
    pub chats: u64,
    pub messages: u64,
    pub messages_by_role: HashMap<String, u64>,
    pub memories: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_message: Option<String>,
}

/// Row counts across the document tables and the vector store.
pub fn collect_stats(conn: &Connection) -> Result<StatsResponse> {
    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let mut stmt = conn.prepare("SELECT role, COUNT(*) FROM messages GROUP BY role")?;
    let messages_by_role = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;

    let (oldest_message, newest_message) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM messages",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(StatsResponse {
        users: count("SELECT COUNT(*) FROM users")?,
        chats: count("SELECT COUNT(*) FROM chats")?,
        messages: messages_by_role.values().sum(),
        messages_by_role,
        memories: crate::memory::store::memory_count(conn)?,
        oldest_message,
        newest_message,
    })
}
