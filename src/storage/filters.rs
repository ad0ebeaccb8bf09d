//! Dynamic filter composition for list and search queries
//!
//! Clause text depends only on which filters are present, never on their
//! values, so a given filter shape always compiles to the same SQL and the
//! prepared-statement cache can key on the text itself.

use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};

use super::queries::{memory_from_row, MEMORY_COLUMNS};
use crate::error::{EngramError, Result};
use crate::types::{ListSort, Memory, MemoryPage};

/// Filter predicates shared by list and search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilters {
    /// Case-insensitive exact category match
    pub category: Option<String>,
    /// Tag membership in the tags array
    pub tag: Option<String>,
    /// Exact project match
    pub project: Option<String>,
    /// `metadata[key] == value`
    pub metadata: Option<MetadataFilter>,
    /// Inclusive created_at lower bound
    pub created_after: Option<String>,
    /// Inclusive created_at upper bound
    pub created_before: Option<String>,
    /// Inclusive updated_at lower bound
    pub updated_after: Option<String>,
    /// Inclusive updated_at upper bound
    pub updated_before: Option<String>,
    /// Include expired rows (history-style scopes only)
    #[serde(default)]
    pub include_expired: bool,
}

/// A single metadata equality predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: serde_json::Value,
}

/// Options for listing memories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(flatten)]
    pub filters: MemoryFilters,
    #[serde(default)]
    pub sort: ListSort,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Default page size for list and search
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

impl MemoryFilters {
    /// Append WHERE clauses and their parameters for this filter set
    ///
    /// Clause text is value-independent: the metadata key is bound through
    /// a `'$.' || ?` path expression rather than formatted into the SQL.
    pub(crate) fn push_clauses(
        &self,
        clauses: &mut Vec<&'static str>,
        params: &mut Vec<Box<dyn ToSql>>,
    ) -> Result<()> {
        if !self.include_expired {
            clauses.push("(m.expires_at IS NULL OR m.expires_at > datetime('now'))");
        }

        if let Some(category) = &self.category {
            clauses.push("m.category = ?");
            params.push(Box::new(category.trim().to_lowercase()));
        }

        if let Some(tag) = &self.tag {
            clauses.push("EXISTS (SELECT 1 FROM json_each(m.tags) WHERE value = ?)");
            params.push(Box::new(tag.trim().to_string()));
        }

        if let Some(project) = &self.project {
            clauses.push("m.project = ?");
            params.push(Box::new(project.clone()));
        }

        if let Some(metadata) = &self.metadata {
            if metadata.key.trim().is_empty() {
                return Err(EngramError::InvalidInput(
                    "metadata filter requires a key".to_string(),
                ));
            }
            clauses.push("json_extract(m.metadata, '$.' || ?) = ?");
            params.push(Box::new(metadata.key.trim().to_string()));
            push_json_param(&metadata.value, params)?;
        }

        if let Some(bound) = &self.created_after {
            clauses.push("m.created_at >= ?");
            params.push(Box::new(crate::normalize::normalize_timestamp(bound)?));
        }

        if let Some(bound) = &self.created_before {
            clauses.push("m.created_at <= ?");
            params.push(Box::new(crate::normalize::normalize_timestamp(bound)?));
        }

        if let Some(bound) = &self.updated_after {
            clauses.push("m.updated_at >= ?");
            params.push(Box::new(crate::normalize::normalize_timestamp(bound)?));
        }

        if let Some(bound) = &self.updated_before {
            clauses.push("m.updated_at <= ?");
            params.push(Box::new(crate::normalize::normalize_timestamp(bound)?));
        }

        Ok(())
    }
}

fn push_json_param(value: &serde_json::Value, params: &mut Vec<Box<dyn ToSql>>) -> Result<()> {
    match value {
        serde_json::Value::String(s) => params.push(Box::new(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                params.push(Box::new(i));
            } else if let Some(f) = n.as_f64() {
                params.push(Box::new(f));
            } else {
                return Err(EngramError::InvalidInput("invalid number".to_string()));
            }
        }
        serde_json::Value::Bool(b) => params.push(Box::new(*b)),
        _ => {
            return Err(EngramError::InvalidInput(
                "metadata filter value must be a string, number, or boolean".to_string(),
            ));
        }
    }
    Ok(())
}

/// Assemble the full list SQL for a filter shape
pub(crate) fn build_list_sql(filters: &MemoryFilters, sort: ListSort) -> Result<(String, Vec<Box<dyn ToSql>>)> {
    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    filters.push_clauses(&mut clauses, &mut params)?;

    let mut sql = format!(
        "SELECT {}, COUNT(*) OVER () AS total FROM memories m",
        MEMORY_COLUMNS
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push(' ');
    sql.push_str(sort.order_clause());
    sql.push_str(" LIMIT ? OFFSET ?");

    Ok((sql, params))
}

/// List memories with the filtered total computed in the same query
pub fn list_with_total(conn: &Connection, options: &ListOptions) -> Result<MemoryPage> {
    let (sql, mut params) = build_list_sql(&options.filters, options.sort)?;

    let limit = options.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(0);
    let offset = options.offset.unwrap_or(0).max(0);
    params.push(Box::new(limit));
    params.push(Box::new(offset));

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();

    let mut total = 0i64;
    let mut memories: Vec<Memory> = Vec::new();
    let mut rows = stmt.query(param_refs.as_slice())?;
    while let Some(row) = rows.next()? {
        total = row.get("total")?;
        memories.push(memory_from_row(row)?);
    }

    // An empty page past the end still needs the true total
    if memories.is_empty() {
        total = count_filtered(conn, &options.filters)?;
    }

    Ok(MemoryPage { memories, total })
}

/// Count rows matching a filter set
pub(crate) fn count_filtered(conn: &Connection, filters: &MemoryFilters) -> Result<i64> {
    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    filters.push_clauses(&mut clauses, &mut params)?;

    let mut sql = "SELECT COUNT(*) FROM memories m".to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let total = stmt.query_row(param_refs.as_slice(), |row| row.get(0))?;
    Ok(total)
}
