//! Full-text search over memory content, category, and tags
//!
//! The FTS index is maintained by schema triggers; this module compiles
//! user input into FTS5 match expressions and runs filtered searches with
//! window-count totals.

use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};

use crate::error::{EngramError, Result};
use crate::storage::filters::{MemoryFilters, DEFAULT_PAGE_LIMIT};
use crate::storage::queries::{memory_from_row, MEMORY_COLUMNS};
use crate::types::{ListSort, MatchMode, Memory, MemoryPage};

/// Default NEAR token distance
pub const DEFAULT_NEAR_DISTANCE: u32 = 10;

/// Options for a full-text search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub query: String,
    #[serde(default)]
    pub mode: MatchMode,
    /// NEAR token distance, 1..=100 (default 10)
    pub near_distance: Option<u32>,
    #[serde(flatten)]
    pub filters: MemoryFilters,
    /// Override the rank ordering with a list sort
    pub sort: Option<ListSort>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Compile user input into an FTS5 match expression
///
/// Tokens are split on whitespace; inner double quotes are escaped by
/// doubling. Returns None when no tokens remain, in which case the search
/// short-circuits to an empty result.
pub fn compile_fts_query(input: &str, mode: MatchMode, near_distance: u32) -> Option<String> {
    let tokens: Vec<String> = input
        .split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| t.replace('"', "\"\""))
        .collect();

    if tokens.is_empty() {
        return None;
    }

    let compiled = match mode {
        MatchMode::Any => tokens
            .iter()
            .map(|t| format!("\"{}\"*", t))
            .collect::<Vec<_>>()
            .join(" OR "),
        MatchMode::All => tokens
            .iter()
            .map(|t| format!("\"{}\"*", t))
            .collect::<Vec<_>>()
            .join(" "),
        MatchMode::Near => {
            let quoted = tokens
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(" ");
            format!("NEAR({}, {})", quoted, near_distance)
        }
    };

    Some(compiled)
}

/// Search with the filtered total computed in the same query
///
/// Default ordering is FTS rank (best first); callers may override with a
/// list sort. Pagination mirrors listing.
pub fn search_with_total(conn: &Connection, options: &SearchOptions) -> Result<MemoryPage> {
    let near_distance = options.near_distance.unwrap_or(DEFAULT_NEAR_DISTANCE);
    if !(1..=100).contains(&near_distance) {
        return Err(EngramError::InvalidInput(format!(
            "near distance must be between 1 and 100, got {}",
            near_distance
        )));
    }

    let Some(match_expr) = compile_fts_query(&options.query, options.mode, near_distance) else {
        return Ok(MemoryPage {
            memories: Vec::new(),
            total: 0,
        });
    };

    let mut clauses = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(match_expr)];
    options.filters.push_clauses(&mut clauses, &mut params)?;

    let mut sql = format!(
        "SELECT {}, COUNT(*) OVER () AS total \
         FROM memories_fts JOIN memories m ON m.rowid = memories_fts.rowid \
         WHERE memories_fts MATCH ?",
        MEMORY_COLUMNS
    );
    for clause in &clauses {
        sql.push_str(" AND ");
        sql.push_str(clause);
    }
    sql.push(' ');
    match options.sort {
        Some(sort) => sql.push_str(sort.order_clause()),
        None => sql.push_str("ORDER BY memories_fts.rank"),
    }
    sql.push_str(" LIMIT ? OFFSET ?");

    params.push(Box::new(options.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(0)));
    params.push(Box::new(options.offset.unwrap_or(0).max(0)));

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();

    let mut total = 0i64;
    let mut memories: Vec<Memory> = Vec::new();
    let mut rows = stmt.query(param_refs.as_slice())?;
    while let Some(row) = rows.next()? {
        total = row.get("total")?;
        memories.push(memory_from_row(row)?);
    }

    Ok(MemoryPage { memories, total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_mode_ors_prefix_terms() {
        let compiled = compile_fts_query("rust sqlite", MatchMode::Any, 10).unwrap();
        assert_eq!(compiled, "\"rust\"* OR \"sqlite\"*");
    }

    #[test]
    fn test_all_mode_is_implicit_and() {
        let compiled = compile_fts_query("rust sqlite", MatchMode::All, 10).unwrap();
        assert_eq!(compiled, "\"rust\"* \"sqlite\"*");
    }

    #[test]
    fn test_near_mode_carries_distance() {
        let compiled = compile_fts_query("rust sqlite", MatchMode::Near, 5).unwrap();
        assert_eq!(compiled, "NEAR(\"rust\" \"sqlite\", 5)");
    }

    #[test]
    fn test_inner_quotes_are_doubled() {
        let compiled = compile_fts_query("say\"hi", MatchMode::Any, 10).unwrap();
        assert_eq!(compiled, "\"say\"\"hi\"*");
    }

    #[test]
    fn test_empty_input_compiles_to_none() {
        assert!(compile_fts_query("   ", MatchMode::Any, 10).is_none());
        assert!(compile_fts_query("", MatchMode::All, 10).is_none());
    }
}
