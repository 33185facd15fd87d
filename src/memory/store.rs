//! Write path for the vector store.

use anyhow::{ensure, Result};
use rusqlite::{params, Connection};

use super::embedding_to_bytes;
use super::types::MemoryMetadata;
use crate::db::migrations::get_embedding_dimensions;

/// Insert the vector under `id`, replacing any vector and metadata already there.
///
/// The vector must match the dimensionality `memories_vec` was created with.
pub fn upsert_memory(
    conn: &mut Connection,
    id: &str,
    vector: &[f32],
    metadata: &MemoryMetadata,
) -> Result<()> {
    if let Some(expected) = get_embedding_dimensions(conn)? {
        ensure!(
            vector.len() == expected,
            "vector has {} dimensions, store expects {expected}",
            vector.len()
        );
    }

    let tx = conn.transaction()?;

    // vec0 has no upsert, so clear the slot first.
    tx.execute("DELETE FROM memories_vec WHERE id = ?1", params![id])?;
    tx.execute("DELETE FROM memory_entries WHERE id = ?1", params![id])?;

    tx.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(vector)],
    )?;
    tx.execute(
        "INSERT INTO memory_entries (id, user_id, chat_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            metadata.user_id,
            metadata.chat_id,
            metadata.text,
            crate::store::now()
        ],
    )?;

    tx.commit()?;
    tracing::debug!(memory = %id, chat = %metadata.chat_id, "memory upserted");
    Ok(())
}

/// Number of vectors stored.
pub fn memory_count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |r| r.get(0))?;
    Ok(n as u64)
}
