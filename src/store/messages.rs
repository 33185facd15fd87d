use anyhow::Result;
use rusqlite::{params, Connection, Row};

use super::types::{Message, Role};

const MESSAGE_COLUMNS: &str = "id, user_id, chat_id, content, role, created_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(4)?;
    Ok(Message {
        id: row.get(0)?,
        user_id: row.get(1)?,
        chat_id: row.get(2)?,
        content: row.get(3)?,
        role: role.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?,
        created_at: row.get(5)?,
    })
}

pub fn insert_message(
    conn: &Connection,
    user_id: Option<&str>,
    chat_id: &str,
    content: &str,
    role: Role,
) -> Result<Message> {
    let id = super::new_id();
    let now = super::now();
    conn.execute(
        "INSERT INTO messages (id, user_id, chat_id, content, role, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, user_id, chat_id, content, role.as_str(), now],
    )?;

    Ok(Message {
        id,
        user_id: user_id.map(str::to_string),
        chat_id: chat_id.to_string(),
        content: content.to_string(),
        role,
        created_at: now,
    })
}

/// The newest `limit` messages of a chat, returned oldest first.
pub fn recent_messages(conn: &Connection, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 \
         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
    ))?;
    let mut messages = stmt
        .query_map(params![chat_id, limit as i64], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(messages)
}

/// Every message of a chat, oldest first.
pub fn list_messages(conn: &Connection, chat_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let messages = stmt
        .query_map(params![chat_id], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}
