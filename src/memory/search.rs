use anyhow::Result;
use rusqlite::{params, Connection};

use super::types::{MemoryFilter, MemoryMatch, MemoryMetadata};

/// Number of hits returned when the caller does not ask for a specific count.
pub const DEFAULT_QUERY_LIMIT: usize = 5;

/// Nearest neighbours of `vector` by cosine distance, best first.
///
/// The metadata filter is applied before ranking, so a filtered query still
/// returns up to `limit` hits when that many matching vectors exist.
pub fn query_memory(
    conn: &Connection,
    vector: &[f32],
    limit: usize,
    filter: &MemoryFilter,
) -> Result<Vec<MemoryMatch>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT e.id, e.user_id, e.chat_id, e.text, \
                vec_distance_cosine(v.embedding, ?1) AS distance \
         FROM memory_entries e \
         JOIN memories_vec v ON v.id = e.id \
         WHERE (?2 IS NULL OR e.user_id = ?2) \
           AND (?3 IS NULL OR e.chat_id = ?3) \
         ORDER BY distance \
         LIMIT ?4",
    )?;

    let matches = stmt
        .query_map(
            params![
                super::embedding_to_bytes(vector),
                filter.user_id,
                filter.chat_id,
                limit as i64
            ],
            |row| {
                let distance: f64 = row.get(4)?;
                Ok(MemoryMatch {
                    id: row.get(0)?,
                    score: 1.0 - distance,
                    metadata: MemoryMetadata {
                        user_id: row.get(1)?,
                        chat_id: row.get(2)?,
                        text: row.get(3)?,
                    },
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(hits = matches.len(), limit, "memory query");
    Ok(matches)
}
