//! History reads and point-in-time restore
//!
//! The trail itself is append-only and produced by schema triggers; this
//! module only reads it. Restore re-applies a snapshot through the normal
//! update path, so the restore itself lands in the trail too.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::queries::{get_memory_any, update_memory};
use crate::error::Result;
use crate::types::{HistoryEntry, Memory, MemoryId, Operation, UpdateMemoryInput};

/// Default page size for history reads
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Options for reading a memory's history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub memory_id: MemoryId,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A page of history entries with the total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: i64,
}

fn history_from_row(row: &Row) -> rusqlite::Result<HistoryEntry> {
    let operation_str: String = row.get("operation")?;
    let tags_str: String = row.get("tags")?;
    let metadata_str: String = row.get("metadata")?;

    let tags: Vec<String> = serde_json::from_str(&tags_str).unwrap_or_default();
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_str).unwrap_or_default();

    Ok(HistoryEntry {
        history_id: row.get("history_id")?,
        memory_id: row.get("memory_id")?,
        operation: operation_str.parse().unwrap_or(Operation::Update),
        content: row.get("content")?,
        category: row.get("category")?,
        tags,
        metadata,
        project: row.get("project")?,
        expires_at: row.get("expires_at")?,
        changed_at: row.get("changed_at")?,
    })
}

/// Read a memory's history, newest first
pub fn get_history(conn: &Connection, query: &HistoryQuery) -> Result<HistoryPage> {
    let mut stmt = conn.prepare_cached(
        "SELECT history_id, memory_id, operation, content, category, tags, metadata,
                project, expires_at, changed_at, COUNT(*) OVER () AS total
         FROM memory_history
         WHERE memory_id = ?
         ORDER BY changed_at DESC, history_id DESC
         LIMIT ? OFFSET ?",
    )?;

    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(0);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut total = 0i64;
    let mut entries = Vec::new();
    let mut rows = stmt.query(params![query.memory_id, limit, offset])?;
    while let Some(row) = rows.next()? {
        total = row.get("total")?;
        entries.push(history_from_row(row)?);
    }

    Ok(HistoryPage { entries, total })
}

/// Fetch one history entry by id
pub fn get_history_entry(conn: &Connection, history_id: i64) -> Result<Option<HistoryEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT history_id, memory_id, operation, content, category, tags, metadata,
                project, expires_at, changed_at
         FROM memory_history WHERE history_id = ?",
    )?;
    let entry = stmt.query_row([history_id], history_from_row).optional()?;
    Ok(entry)
}

/// Restore a memory to a recorded snapshot
///
/// Returns None when the memory no longer exists or the history row does
/// not belong to it. The snapshot is applied through `update_memory`, so
/// the restore produces its own `update` history row and is auditable.
pub fn restore_memory(
    conn: &Connection,
    memory_id: &str,
    history_id: i64,
) -> Result<Option<Memory>> {
    let Some(entry) = get_history_entry(conn, history_id)? else {
        return Ok(None);
    };
    if entry.memory_id != memory_id {
        return Ok(None);
    }
    if get_memory_any(conn, memory_id)?.is_none() {
        return Ok(None);
    }

    let input = UpdateMemoryInput {
        content: Some(entry.content),
        category: Some(entry.category),
        tags: Some(entry.tags),
        metadata: Some(entry.metadata),
        project: Some(entry.project),
        expires_at: Some(entry.expires_at),
    };

    update_memory(conn, memory_id, &input).map(Some)
}
