//! Memory store operations: CRUD, batches, import/export, TTL purge
//!
//! All functions take a plain connection; transaction boundaries belong to
//! the caller (`Storage::with_transaction`). History rows and the FTS index
//! are maintained by schema triggers, never written by hand here.

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::HashMap;

use crate::error::{EngramError, Result};
use crate::graph::autolink;
use crate::normalize::{
    content_fingerprint, new_memory_id, normalize_category, normalize_content, normalize_project,
    normalize_tags, normalize_timestamp,
};
use crate::types::*;

/// Column list shared by every memory projection (`m` alias)
pub const MEMORY_COLUMNS: &str =
    "m.id, m.content, m.category, m.tags, m.metadata, m.project, m.created_at, m.updated_at, m.expires_at";

/// Parse a memory from a database row
pub fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let tags_str: String = row.get("tags")?;
    let metadata_str: String = row.get("metadata")?;

    let tags: Vec<String> = serde_json::from_str(&tags_str).unwrap_or_default();
    let metadata: HashMap<String, serde_json::Value> =
        serde_json::from_str(&metadata_str).unwrap_or_default();

    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        category: row.get("category")?,
        tags,
        metadata,
        project: row.get("project")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        expires_at: row.get("expires_at")?,
    })
}

fn get_memory_internal(conn: &Connection, id: &str, include_expired: bool) -> Result<Option<Memory>> {
    let sql = if include_expired {
        format!("SELECT {} FROM memories m WHERE m.id = ?", MEMORY_COLUMNS)
    } else {
        format!(
            "SELECT {} FROM memories m WHERE m.id = ? \
             AND (m.expires_at IS NULL OR m.expires_at > datetime('now'))",
            MEMORY_COLUMNS
        )
    };

    let mut stmt = conn.prepare_cached(&sql)?;
    let memory = stmt.query_row([id], memory_from_row).optional()?;
    Ok(memory)
}

/// Get a live memory by id
pub fn get_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    get_memory_internal(conn, id, false)
}

/// Get a memory regardless of TTL state (restore and upsert paths)
pub(crate) fn get_memory_any(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    get_memory_internal(conn, id, true)
}

/// Get several live memories; input order is preserved, misses are dropped
pub fn get_memories(conn: &Connection, ids: &[String]) -> Result<Vec<Memory>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM memories m WHERE m.id IN ({}) \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now'))",
        MEMORY_COLUMNS, placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
    let mut by_id: HashMap<String, Memory> = stmt
        .query_map(param_refs.as_slice(), memory_from_row)?
        .filter_map(|r| r.ok())
        .map(|m| (m.id.clone(), m))
        .collect();

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Create a memory
///
/// Normalizes all fields, optionally short-circuits on a same-project
/// content fingerprint match, and runs link inference unless opted out.
/// Inference failures are swallowed so they can never break the write.
pub fn create_memory(conn: &Connection, input: &CreateMemoryInput) -> Result<CreatedMemory> {
    let content = normalize_content(&input.content)?;
    let category = normalize_category(input.category.as_deref());
    let tags = normalize_tags(&input.tags);
    let project = normalize_project(input.project.as_deref());
    let expires_at = match &input.expires_at {
        Some(ts) => Some(normalize_timestamp(ts)?),
        None => None,
    };

    if input.dedup {
        if let Some(existing) = find_duplicate(conn, &content, &project)? {
            return Ok(CreatedMemory {
                memory: existing,
                deduplicated: true,
            });
        }
    }

    let id = new_memory_id();
    let tags_json = serde_json::to_string(&tags)?;
    let metadata_json = serde_json::to_string(&input.metadata)?;

    conn.execute(
        "INSERT INTO memories (id, content, category, tags, metadata, project, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![id, content, category, tags_json, metadata_json, project, expires_at],
    )?;

    let memory = get_memory_any(conn, &id)?.ok_or_else(|| {
        EngramError::Storage(format!("freshly inserted memory {} vanished", id))
    })?;

    if input.auto_link {
        autolink::auto_link(conn, &memory);
    }

    Ok(CreatedMemory {
        memory,
        deduplicated: false,
    })
}

/// Create several memories; the caller wraps this in one transaction
pub fn create_memory_batch(
    conn: &Connection,
    inputs: &[CreateMemoryInput],
) -> Result<Vec<CreatedMemory>> {
    // Reject invalid entries before any row is written
    for input in inputs {
        normalize_content(&input.content)?;
        if let Some(ts) = &input.expires_at {
            normalize_timestamp(ts)?;
        }
    }

    inputs.iter().map(|input| create_memory(conn, input)).collect()
}

/// Find a live memory in the project whose trimmed content hashes the same
pub fn find_duplicate(conn: &Connection, content: &str, project: &str) -> Result<Option<Memory>> {
    let fingerprint = content_fingerprint(content);

    let sql = format!(
        "SELECT {} FROM memories m WHERE m.project = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now'))",
        MEMORY_COLUMNS
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let candidates = stmt.query_map([project], memory_from_row)?;

    for candidate in candidates {
        let candidate = candidate?;
        if content_fingerprint(&candidate.content) == fingerprint {
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Update a memory
///
/// Omitted fields keep existing values; `tags`/`metadata` replace wholesale;
/// `expires_at` distinguishes omit (keep), null (clear), value (set).
pub fn update_memory(conn: &Connection, id: &str, input: &UpdateMemoryInput) -> Result<Memory> {
    if input.is_empty() {
        return Err(EngramError::InvalidInput(
            "update requires at least one field".to_string(),
        ));
    }

    if get_memory_any(conn, id)?.is_none() {
        return Err(EngramError::NotFound(id.to_string()));
    }

    let mut updates = vec!["updated_at = datetime('now')".to_string()];
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(content) = &input.content {
        updates.push("content = ?".to_string());
        values.push(Box::new(normalize_content(content)?));
    }

    if let Some(category) = &input.category {
        updates.push("category = ?".to_string());
        values.push(Box::new(normalize_category(Some(category))));
    }

    if let Some(tags) = &input.tags {
        updates.push("tags = ?".to_string());
        values.push(Box::new(serde_json::to_string(&normalize_tags(tags))?));
    }

    if let Some(metadata) = &input.metadata {
        updates.push("metadata = ?".to_string());
        values.push(Box::new(serde_json::to_string(metadata)?));
    }

    if let Some(project) = &input.project {
        updates.push("project = ?".to_string());
        values.push(Box::new(normalize_project(Some(project))));
    }

    match &input.expires_at {
        Some(Some(ts)) => {
            updates.push("expires_at = ?".to_string());
            values.push(Box::new(normalize_timestamp(ts)?));
        }
        Some(None) => updates.push("expires_at = NULL".to_string()),
        None => {}
    }

    let sql = format!("UPDATE memories SET {} WHERE id = ?", updates.join(", "));
    values.push(Box::new(id.to_string()));

    let param_refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();
    conn.execute(&sql, param_refs.as_slice())?;

    get_memory_any(conn, id)?.ok_or_else(|| EngramError::NotFound(id.to_string()))
}

/// Update several memories in one transaction
///
/// Per-item misses are reported, never raised; entries with no updatable
/// fields are rejected before any row is written.
pub fn update_memory_batch(
    conn: &Connection,
    entries: &[UpdateBatchEntry],
) -> Result<BatchUpdateResult> {
    for entry in entries {
        if entry.input.is_empty() {
            return Err(EngramError::InvalidInput(format!(
                "update entry for {} has no fields",
                entry.id
            )));
        }
    }

    let mut updated = Vec::new();
    let mut not_found = Vec::new();

    for entry in entries {
        match update_memory(conn, &entry.id, &entry.input) {
            Ok(_) => updated.push(entry.id.clone()),
            Err(EngramError::NotFound(id)) => not_found.push(id),
            Err(e) => return Err(e),
        }
    }

    Ok(BatchUpdateResult { updated, not_found })
}

/// Delete a memory; its edges cascade and the history trail keeps the
/// pre-image snapshot
pub fn delete_memory(conn: &Connection, id: &str) -> Result<()> {
    let changed = conn.execute("DELETE FROM memories WHERE id = ?", [id])?;
    if changed == 0 {
        return Err(EngramError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Delete several memories in one transaction; misses are reported
pub fn delete_memory_batch(conn: &Connection, ids: &[String]) -> Result<BatchDeleteResult> {
    let mut deleted = Vec::new();
    let mut not_found = Vec::new();

    for id in ids {
        match delete_memory(conn, id) {
            Ok(()) => deleted.push(id.clone()),
            Err(EngramError::NotFound(id)) => not_found.push(id),
            Err(e) => return Err(e),
        }
    }

    Ok(BatchDeleteResult { deleted, not_found })
}

/// Dump every physical row, expired ones included
pub fn export_memories(conn: &Connection) -> Result<ExportData> {
    let sql = format!(
        "SELECT {} FROM memories m ORDER BY m.created_at ASC, m.rowid ASC",
        MEMORY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let memories: Vec<Memory> = stmt
        .query_map([], memory_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let exported_at: String = conn.query_row("SELECT datetime('now')", [], |row| row.get(0))?;

    Ok(ExportData {
        version: "1.0".to_string(),
        exported_at,
        memory_count: memories.len(),
        memories,
    })
}

/// Import rows in one transaction
///
/// `insert` always generates fresh ids; `upsert` updates rows whose supplied
/// id exists and inserts the rest. Empty-content rows are skipped and
/// counted. Import never runs link inference.
pub fn import_memories(
    conn: &Connection,
    entries: &[ImportEntry],
    mode: ImportMode,
) -> Result<ImportResult> {
    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut ids = Vec::new();

    for entry in entries {
        if entry.content.trim().is_empty() {
            skipped += 1;
            continue;
        }

        if mode == ImportMode::Upsert {
            if let Some(id) = &entry.id {
                if get_memory_any(conn, id)?.is_some() {
                    let update = UpdateMemoryInput {
                        content: Some(entry.content.clone()),
                        category: Some(entry.category.clone().unwrap_or_default()),
                        tags: Some(entry.tags.clone()),
                        metadata: Some(entry.metadata.clone()),
                        project: Some(entry.project.clone().unwrap_or_default()),
                        expires_at: Some(entry.expires_at.clone()),
                    };
                    update_memory(conn, id, &update)?;
                    imported += 1;
                    ids.push(id.clone());
                    continue;
                }
            }
        }

        let input = CreateMemoryInput {
            content: entry.content.clone(),
            category: entry.category.clone(),
            tags: entry.tags.clone(),
            metadata: entry.metadata.clone(),
            project: entry.project.clone(),
            expires_at: entry.expires_at.clone(),
            auto_link: false,
            dedup: false,
        };
        let created = create_memory(conn, &input)?;
        imported += 1;
        ids.push(created.memory.id);
    }

    Ok(ImportResult {
        imported,
        skipped,
        ids,
    })
}

/// Physically delete every expired memory
///
/// Each deletion flows through the history trigger, so expired rows keep
/// their final `delete` snapshot.
pub fn purge_expired(conn: &Connection) -> Result<PurgeResult> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM memories WHERE expires_at IS NOT NULL AND expires_at <= datetime('now')",
    )?;
    let ids: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let mut delete = conn.prepare_cached("DELETE FROM memories WHERE id = ?")?;
    for id in &ids {
        delete.execute([id])?;
    }

    Ok(PurgeResult {
        purged: ids.len(),
        ids,
    })
}
