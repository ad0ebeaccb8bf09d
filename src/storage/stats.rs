//! Aggregates and session-context snapshots

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::queries::{memory_from_row, MEMORY_COLUMNS};
use crate::error::Result;
use crate::types::{Memory, MemoryId};

/// Tags reported by the stats top list
const TOP_TAG_LIMIT: i64 = 20;

/// A category with its live memory count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// A tag with its frequency across live memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// Store-wide statistics over live memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_memories: i64,
    /// Counts by category, descending
    pub by_category: Vec<CategoryCount>,
    /// Top tags by frequency
    pub top_tags: Vec<TagCount>,
    pub oldest: Option<Memory>,
    pub newest: Option<Memory>,
    /// Average content length in characters, rounded
    pub avg_content_length: i64,
    /// Live memories with an empty tags array
    pub without_tags: i64,
    /// Live memories with an empty metadata object
    pub without_metadata: i64,
}

/// Compute statistics, optionally scoped to one project
pub fn get_stats(conn: &Connection, project: Option<&str>) -> Result<StoreStats> {
    // The alive predicate and optional project scope are shared by every
    // aggregate below; two SQL shapes total, picked once.
    let (scope, scope_params): (&str, Vec<Box<dyn ToSql>>) = match project {
        Some(p) => (
            "(m.expires_at IS NULL OR m.expires_at > datetime('now')) AND m.project = ?",
            vec![Box::new(p.to_string())],
        ),
        None => (
            "(m.expires_at IS NULL OR m.expires_at > datetime('now'))",
            vec![],
        ),
    };
    let param_refs: Vec<&dyn ToSql> = scope_params.iter().map(|b| b.as_ref()).collect();

    let total_memories: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM memories m WHERE {}", scope),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT m.category, COUNT(*) AS count FROM memories m WHERE {} \
         GROUP BY m.category ORDER BY count DESC",
        scope
    ))?;
    let by_category: Vec<CategoryCount> = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(CategoryCount {
                category: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT jt.value, COUNT(*) AS count FROM memories m, json_each(m.tags) jt \
         WHERE {} GROUP BY jt.value ORDER BY count DESC, jt.value ASC LIMIT {}",
        scope, TOP_TAG_LIMIT
    ))?;
    let top_tags: Vec<TagCount> = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(TagCount {
                tag: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM memories m WHERE {} ORDER BY m.created_at ASC, m.rowid ASC LIMIT 1",
        MEMORY_COLUMNS, scope
    ))?;
    let oldest = stmt
        .query_row(param_refs.as_slice(), memory_from_row)
        .optional()?;

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM memories m WHERE {} ORDER BY m.created_at DESC, m.rowid DESC LIMIT 1",
        MEMORY_COLUMNS, scope
    ))?;
    let newest = stmt
        .query_row(param_refs.as_slice(), memory_from_row)
        .optional()?;

    let avg_content_length: i64 = conn.query_row(
        &format!(
            "SELECT CAST(COALESCE(ROUND(AVG(LENGTH(m.content))), 0) AS INTEGER) \
             FROM memories m WHERE {}",
            scope
        ),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    let without_tags: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM memories m WHERE {} AND json_array_length(m.tags) = 0",
            scope
        ),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    let without_metadata: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM memories m WHERE {} AND m.metadata = '{{}}'",
            scope
        ),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    Ok(StoreStats {
        total_memories,
        by_category,
        top_tags,
        oldest,
        newest,
        avg_content_length,
        without_tags,
        without_metadata,
    })
}

/// Options for the context snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOptions {
    /// Recent memories listed per category
    pub recent_per_category: Option<i64>,
    /// Truncate previewed content to this many characters
    pub preview_len: Option<usize>,
    /// Include the tag frequency map (default: true)
    pub include_tags_index: Option<bool>,
    pub project: Option<String>,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            recent_per_category: Some(3),
            preview_len: None,
            include_tags_index: Some(true),
            project: None,
        }
    }
}

/// Slim projection used inside the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMemory {
    pub id: MemoryId,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub project: String,
}

/// One category with its total and most recent entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub category: String,
    pub total: i64,
    pub recent: Vec<SnapshotMemory>,
}

/// Compact session-context snapshot of a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub project: String,
    pub categories: Vec<CategorySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, i64>>,
}

/// Build the snapshot in a single window-function pass
///
/// Every live project memory is ranked by recency within its category;
/// rows within the requested rank contribute to that category's recent
/// list. The tag index is a second query, elided when disabled.
pub fn get_context_snapshot(conn: &Connection, options: &SnapshotOptions) -> Result<ContextSnapshot> {
    let project = crate::normalize::normalize_project(options.project.as_deref());
    let recent_per_category = options.recent_per_category.unwrap_or(3).max(0);

    let mut stmt = conn.prepare_cached(
        "SELECT id, content, category, tags, project,
                COUNT(*) OVER (PARTITION BY category) AS category_total,
                ROW_NUMBER() OVER (
                    PARTITION BY category
                    ORDER BY created_at DESC, rowid DESC
                ) AS recency_rank
         FROM memories
         WHERE project = ?
           AND (expires_at IS NULL OR expires_at > datetime('now'))
         ORDER BY category ASC, recency_rank ASC",
    )?;

    let mut categories: Vec<CategorySnapshot> = Vec::new();
    let mut rows = stmt.query([&project])?;
    while let Some(row) = rows.next()? {
        let category: String = row.get("category")?;
        let category_total: i64 = row.get("category_total")?;
        let recency_rank: i64 = row.get("recency_rank")?;

        if categories.last().map(|c| c.category.as_str()) != Some(category.as_str()) {
            categories.push(CategorySnapshot {
                category: category.clone(),
                total: category_total,
                recent: Vec::new(),
            });
        }

        if recency_rank > recent_per_category {
            continue;
        }

        let content: String = row.get("content")?;
        let content = match options.preview_len {
            Some(len) => content.chars().take(len).collect(),
            None => content,
        };
        let tags_str: String = row.get("tags")?;

        if let Some(current) = categories.last_mut() {
            current.recent.push(SnapshotMemory {
                id: row.get("id")?,
                content,
                category,
                tags: serde_json::from_str(&tags_str).unwrap_or_default(),
                project: row.get("project")?,
            });
        }
    }

    let tags = if options.include_tags_index.unwrap_or(true) {
        let mut stmt = conn.prepare_cached(
            "SELECT jt.value, COUNT(*) FROM memories m, json_each(m.tags) jt \
             WHERE m.project = ? \
             AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
             GROUP BY jt.value",
        )?;
        let map: HashMap<String, i64> = stmt
            .query_map(params![project], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Some(map)
    } else {
        None
    };

    Ok(ContextSnapshot {
        project,
        categories,
        tags,
    })
}
