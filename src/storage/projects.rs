//! Project namespaces: listing, tag-based migration, tag rename

use rusqlite::{params, Connection, ToSql};

use crate::error::{EngramError, Result};
use crate::normalize::normalize_project;
use crate::types::{ProjectInfo, RenameTagResult};

/// List distinct project names with live memory counts, descending
pub fn list_projects(conn: &Connection) -> Result<Vec<ProjectInfo>> {
    let mut stmt = conn.prepare_cached(
        "SELECT project, COUNT(*) AS count FROM memories
         WHERE expires_at IS NULL OR expires_at > datetime('now')
         GROUP BY project ORDER BY count DESC, project ASC",
    )?;

    let projects = stmt
        .query_map([], |row| {
            Ok(ProjectInfo {
                project: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(projects)
}

/// Reassign every live memory carrying a tag to another project
///
/// Bumps `updated_at`; returns the number of rows moved.
pub fn migrate_to_project(conn: &Connection, tag: &str, project: &str) -> Result<i64> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(EngramError::InvalidInput("tag must not be empty".to_string()));
    }
    let project = normalize_project(Some(project));

    let changed = conn.execute(
        "UPDATE memories SET project = ?, updated_at = datetime('now')
         WHERE EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE value = ?)
           AND (expires_at IS NULL OR expires_at > datetime('now'))",
        params![project, tag],
    )?;

    Ok(changed as i64)
}

/// Rename a tag across a project (or every project)
///
/// Rewrites the tags array of every live memory carrying the old tag,
/// deduplicating with a distinct aggregation, and bumps `updated_at`.
/// Renaming a tag onto itself is a no-op returning 0.
pub fn rename_tag(
    conn: &Connection,
    old_tag: &str,
    new_tag: &str,
    project: Option<&str>,
) -> Result<RenameTagResult> {
    let old_tag = old_tag.trim().to_string();
    let new_tag = new_tag.trim().to_string();

    if old_tag.is_empty() || new_tag.is_empty() {
        return Err(EngramError::InvalidInput(
            "tag names must not be empty".to_string(),
        ));
    }

    if old_tag == new_tag {
        return Ok(RenameTagResult {
            updated: 0,
            old_tag,
            new_tag,
        });
    }

    let mut sql = "UPDATE memories SET
             tags = (SELECT json_group_array(DISTINCT CASE WHEN je.value = ?1 THEN ?2 ELSE je.value END)
                     FROM json_each(memories.tags) je),
             updated_at = datetime('now')
         WHERE EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE value = ?1)
           AND (expires_at IS NULL OR expires_at > datetime('now'))"
        .to_string();
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(old_tag.clone()), Box::new(new_tag.clone())];

    if let Some(project) = project {
        sql.push_str(" AND project = ?3");
        params.push(Box::new(project.to_string()));
    }

    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let updated = conn.execute(&sql, param_refs.as_slice())? as i64;

    Ok(RenameTagResult {
        updated,
        old_tag,
        new_tag,
    })
}
