//! Memory repository — the canonical view of stored memories.
//!
//! Owns identity and metadata invariants and translates domain operations
//! into SQLite + sqlite-vec calls. Embeddings are computed by the caller
//! *before* these functions run, so the connection lock is never held across
//! an embedding computation.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use crate::embedding::EMBEDDING_DIM;
use crate::error::{EngramError, Result};
use crate::memory::types::{Memory, MemoryStats};
use crate::memory::{distance_to_score, embedding_to_bytes};

/// Store a new memory with its embedding. Row and vector are inserted in one
/// transaction; on any failure nothing is persisted.
pub fn add_memory(
    conn: &mut Connection,
    content: &str,
    metadata: Option<&serde_json::Value>,
    client_id: &str,
    embedding: &[f32],
) -> Result<Memory> {
    if content.is_empty() {
        return Err(EngramError::Validation("content must not be empty".into()));
    }
    if embedding.len() != EMBEDDING_DIM {
        return Err(EngramError::Dependency(format!(
            "embedding provider returned {} dimensions, expected {EMBEDDING_DIM}",
            embedding.len()
        )));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let metadata_json = metadata
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| EngramError::Validation(format!("metadata is not valid JSON: {e}")))?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO memories (id, content, client_id, created_at, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, content, client_id, now, metadata_json],
    )?;
    tx.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(embedding)],
    )?;
    tx.commit()?;

    Ok(Memory {
        id,
        content: content.to_string(),
        embedding: None,
        metadata: metadata.cloned(),
        created_at: now,
        client_id: client_id.to_string(),
    })
}

/// Fetch a single memory by ID.
pub fn get_memory(conn: &Connection, id: &str) -> Result<Memory> {
    let row = conn
        .query_row(
            "SELECT id, content, client_id, created_at, metadata \
             FROM memories WHERE id = ?1",
            params![id],
            map_memory_row,
        )
        .optional()?;

    row.ok_or_else(|| EngramError::NotFound(format!("memory not found: {id}")))
}

/// List memories ordered by creation time descending (id descending breaks
/// ties deterministically). Returns the page plus the total count. An offset
/// past the end yields an empty page, not an error.
pub fn list_memories(
    conn: &Connection,
    limit: usize,
    offset: usize,
) -> Result<(Vec<Memory>, u64)> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT id, content, client_id, created_at, metadata \
         FROM memories ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
    )?;
    let memories = stmt
        .query_map(params![limit as i64, offset as i64], map_memory_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((memories, total as u64))
}

/// Raw k-nearest-neighbor retrieval. Returns up to `top_k` memories with
/// similarity-like scores, best first. When the store holds fewer than
/// `top_k` records, everything is returned.
pub fn knn(conn: &Connection, embedding: &[f32], top_k: usize) -> Result<Vec<(Memory, f64)>> {
    if top_k < 1 {
        return Err(EngramError::Validation("top_k must be >= 1".into()));
    }

    let mut stmt = conn.prepare(
        "SELECT id, distance FROM memories_vec \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let hits: Vec<(String, f64)> = stmt
        .query_map(params![embedding_to_bytes(embedding), top_k as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
    let mut records = fetch_memories(conn, &ids)?;

    let mut results = Vec::with_capacity(hits.len());
    for (id, distance) in &hits {
        if let Some(memory) = records.remove(id.as_str()) {
            results.push((memory, distance_to_score(*distance)));
        } else {
            tracing::warn!(id = %id, "vector hit with no memory row — skipping");
        }
    }
    Ok(results)
}

/// Fetch the stored embedding for a memory. Used by similarity-by-id so the
/// vector is never recomputed.
pub fn get_embedding(conn: &Connection, id: &str) -> Result<Vec<f32>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM memories_vec WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    let blob = blob.ok_or_else(|| EngramError::NotFound(format!("memory not found: {id}")))?;
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Delete all memories, their vectors, and (incidentally) all edges.
/// Returns the number of memories removed.
pub fn clear_all(conn: &mut Connection) -> Result<u64> {
    let tx = conn.transaction()?;
    let count: i64 = tx.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    tx.execute("DELETE FROM memory_edges", [])?;
    tx.execute("DELETE FROM memories_vec", [])?;
    tx.execute("DELETE FROM memories", [])?;
    tx.commit()?;
    Ok(count as u64)
}

/// Compute store statistics from current state. Never cached — reflects all
/// mutations completed before the call.
pub fn stats(conn: &Connection) -> Result<MemoryStats> {
    let (total, unique_clients): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT client_id) FROM memories",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM memories",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(MemoryStats {
        total_memories: total as u64,
        unique_clients: unique_clients as u64,
        oldest_memory: oldest,
        newest_memory: newest,
    })
}

/// Batch-fetch memory records by IDs, keyed by ID.
pub(crate) fn fetch_memories(
    conn: &Connection,
    ids: &[&str],
) -> Result<HashMap<String, Memory>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    // Build a parameterized IN clause
    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, content, client_id, created_at, metadata \
         FROM memories WHERE id IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params_vec: Vec<&dyn rusqlite::types::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

    let rows = stmt
        .query_map(params_vec.as_slice(), map_memory_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut map = HashMap::new();
    for memory in rows {
        map.insert(memory.id.clone(), memory);
    }
    Ok(map)
}

fn map_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let metadata_str: Option<String> = row.get(4)?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        client_id: row.get(2)?,
        created_at: row.get(3)?,
        metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        embedding: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[dim % EMBEDDING_DIM] = 1.0;
        v
    }

    #[test]
    fn add_then_get_round_trips() {
        let mut conn = test_db();
        let meta = serde_json::json!({"topic": "testing"});
        let stored =
            add_memory(&mut conn, "a fact worth keeping", Some(&meta), "agent-1", &spike(0))
                .unwrap();

        let fetched = get_memory(&conn, &stored.id).unwrap();
        assert_eq!(fetched.content, "a fact worth keeping");
        assert_eq!(fetched.client_id, "agent-1");
        assert_eq!(fetched.metadata, Some(meta));
        assert_eq!(fetched.created_at, stored.created_at);
    }

    #[test]
    fn ids_are_unique() {
        let mut conn = test_db();
        let a = add_memory(&mut conn, "one", None, "c", &spike(0)).unwrap();
        let b = add_memory(&mut conn, "two", None, "c", &spike(1)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn empty_content_is_validation_error() {
        let mut conn = test_db();
        let err = add_memory(&mut conn, "", None, "c", &spike(0)).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn wrong_dimension_is_dependency_error() {
        let mut conn = test_db();
        let err = add_memory(&mut conn, "content", None, "c", &[0.5f32; 3]).unwrap_err();
        assert_eq!(err.kind(), "dependency_error");
    }

    #[test]
    fn get_missing_is_not_found() {
        let conn = test_db();
        let err = get_memory(&conn, "nope").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn list_is_newest_first_and_paginated() {
        let mut conn = test_db();
        for i in 0..5 {
            add_memory(&mut conn, &format!("memory {i}"), None, "c", &spike(i)).unwrap();
        }

        let (page, total) = list_memories(&conn, 2, 0).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        // UUID v7 is time-sortable, so newest-first equals reverse insertion order
        assert_eq!(page[0].content, "memory 4");
        assert_eq!(page[1].content, "memory 3");

        let (page, _) = list_memories(&conn, 2, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content, "memory 0");

        // Offset past the end is empty, not an error
        let (page, total) = list_memories(&conn, 10, 100).unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 5);
    }

    #[test]
    fn knn_returns_nearest_first() {
        let mut conn = test_db();
        let a = add_memory(&mut conn, "target", None, "c", &spike(0)).unwrap();
        add_memory(&mut conn, "other", None, "c", &spike(100)).unwrap();

        let results = knn(&conn, &spike(0), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, a.id);
        assert!(results[0].1 > results[1].1);
        assert!((results[0].1 - 1.0).abs() < 1e-6); // exact match scores 1.0
    }

    #[test]
    fn knn_with_fewer_records_than_top_k() {
        let mut conn = test_db();
        add_memory(&mut conn, "only one", None, "c", &spike(0)).unwrap();
        let results = knn(&conn, &spike(0), 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn knn_rejects_zero_top_k() {
        let conn = test_db();
        let err = knn(&conn, &spike(0), 0).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn stored_embedding_round_trips() {
        let mut conn = test_db();
        let emb = spike(7);
        let m = add_memory(&mut conn, "vector check", None, "c", &emb).unwrap();
        let fetched = get_embedding(&conn, &m.id).unwrap();
        assert_eq!(fetched, emb);
    }

    #[test]
    fn clear_empties_store_and_reports_count() {
        let mut conn = test_db();
        for i in 0..3 {
            add_memory(&mut conn, &format!("m{i}"), None, "c", &spike(i)).unwrap();
        }
        assert_eq!(clear_all(&mut conn).unwrap(), 3);

        let (page, total) = list_memories(&conn, 10, 0).unwrap();
        assert!(page.is_empty());
        assert_eq!(total, 0);
        assert_eq!(stats(&conn).unwrap().total_memories, 0);

        // Clearing an empty store is fine
        assert_eq!(clear_all(&mut conn).unwrap(), 0);
    }

    #[test]
    fn stats_reflect_current_state() {
        let mut conn = test_db();
        let empty = stats(&conn).unwrap();
        assert_eq!(empty.total_memories, 0);
        assert!(empty.oldest_memory.is_none());

        add_memory(&mut conn, "from a", None, "agent-a", &spike(0)).unwrap();
        add_memory(&mut conn, "from b", None, "agent-b", &spike(1)).unwrap();
        add_memory(&mut conn, "also from a", None, "agent-a", &spike(2)).unwrap();

        let s = stats(&conn).unwrap();
        assert_eq!(s.total_memories, 3);
        assert_eq!(s.unique_clients, 2);
        assert!(s.oldest_memory.is_some());
        assert!(s.newest_memory.is_some());
        assert!(s.oldest_memory <= s.newest_memory);
    }
}
