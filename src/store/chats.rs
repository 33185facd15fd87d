use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::Chat;

const CHAT_COLUMNS: &str = "id, user_id, title, last_activity, created_at";

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        last_activity: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn create_chat(conn: &Connection, user_id: &str, title: &str) -> Result<Chat> {
    let title = title.trim();
    if title.is_empty() {
        bail!("chat title must not be empty");
    }

    let id = super::new_id();
    let now = super::now();
    conn.execute(
        "INSERT INTO chats (id, user_id, title, last_activity, created_at) VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, user_id, title, now],
    )?;

    Ok(Chat {
        id,
        user_id: user_id.to_string(),
        title: title.to_string(),
        last_activity: now.clone(),
        created_at: now,
    })
}

/// All chats owned by `user_id`, most recently created first.
pub fn list_chats(conn: &Connection, user_id: &str) -> Result<Vec<Chat>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let chats = stmt
        .query_map(params![user_id], chat_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chats)
}

pub fn find_chat(conn: &Connection, chat_id: &str) -> Result<Option<Chat>> {
    let chat = conn
        .query_row(
            &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
            params![chat_id],
            chat_from_row,
        )
        .optional()?;
    Ok(chat)
}

/// The chat, only if it exists and is owned by `user_id`.
pub fn find_owned_chat(conn: &Connection, chat_id: &str, user_id: &str) -> Result<Option<Chat>> {
    Ok(find_chat(conn, chat_id)?.filter(|chat| chat.user_id == user_id))
}

/// Bump `last_activity` to now.
pub fn touch_chat(conn: &Connection, chat_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE chats SET last_activity = ?1 WHERE id = ?2",
        params![super::now(), chat_id],
    )?;
    Ok(())
}
