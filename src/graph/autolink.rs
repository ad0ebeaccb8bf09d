//! Link inference and suggestion heuristics
//!
//! Three signals, all scoped to the memory's project and live peers:
//! shared tags, content similarity via the FTS index, and temporal
//! proximity within a category. The numeric constants are part of the
//! contract and pinned by tests.
//!
//! Inference runs inside the create path; every failure is swallowed so a
//! legitimate write can never be broken by it.

use rusqlite::{params, Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::Result;
use crate::search::compile_fts_query;
use crate::storage::queries::{memory_from_row, MEMORY_COLUMNS};
use crate::types::{MatchMode, Memory, MemoryId, Relation};

/// Weight contributed per shared tag
pub const SHARED_TAG_WEIGHT: f64 = 0.3;
/// Minimum tag overlap for an inferred edge
pub const SHARED_TAG_MIN_OVERLAP: i64 = 2;
/// Candidate cap for the shared-tag signal
pub const SHARED_TAG_CANDIDATES: i64 = 10;

/// Content tokens taken from the new memory for the similarity probe
pub const CONTENT_PROBE_TOKENS: usize = 5;
/// FTS rank must be strictly below this to count as similar
pub const CONTENT_RANK_THRESHOLD: f64 = -0.5;
/// Weight bounds for similarity edges
pub const CONTENT_WEIGHT_MIN: f64 = 0.1;
pub const CONTENT_WEIGHT_MAX: f64 = 0.9;
/// Candidate cap for the similarity signal
pub const CONTENT_CANDIDATES: usize = 5;

/// Window for temporal proximity, in hours
pub const TEMPORAL_WINDOW_HOURS: f64 = 1.0;
/// Weight of temporal edges
pub const TEMPORAL_WEIGHT: f64 = 0.4;
/// Candidate cap for the temporal signal
pub const TEMPORAL_CANDIDATES: i64 = 5;

/// Default cap for suggestions
pub const DEFAULT_SUGGESTION_LIMIT: usize = 20;
/// Orphans analyzed per suggestion pass when no id is given
const ORPHAN_BATCH: i64 = 5;
/// Preview length in suggestion payloads
const SUGGESTION_PREVIEW_CHARS: usize = 80;

/// Why a link was suggested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestReason {
    SharedTags,
    ContentSimilarity,
    TemporalProximity,
}

/// A non-mutating link proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub from_id: MemoryId,
    pub to_id: MemoryId,
    pub preview: String,
    pub category: String,
    pub tags: Vec<String>,
    pub suggested_relation: Relation,
    pub weight: f64,
    pub reason: SuggestReason,
}

/// Options for `suggest_links`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestOptions {
    /// Analyze this memory; when absent, analyze project orphans
    pub id: Option<MemoryId>,
    pub project: Option<String>,
    pub limit: Option<usize>,
}

/// A scored peer found by one of the heuristics
struct Candidate {
    memory: Memory,
    relation: Relation,
    weight: f64,
    reason: SuggestReason,
}

/// Run inference for a freshly created memory, swallowing all failures
pub fn auto_link(conn: &Connection, memory: &Memory) {
    if let Err(e) = infer_links(conn, memory) {
        tracing::debug!(memory_id = %memory.id, error = %e, "link inference failed");
    }
}

/// Create inferred edges from `memory` to its candidates
///
/// An edge is only written when `(memory.id -> candidate.id)` does not
/// already exist.
fn infer_links(conn: &Connection, memory: &Memory) -> Result<usize> {
    let mut created = 0;

    for candidate in collect_candidates(conn, memory, SHARED_TAG_MIN_OVERLAP)? {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO memory_links (from_id, to_id, relation, weight, auto_generated)
             VALUES (?, ?, ?, ?, 1)",
            params![
                memory.id,
                candidate.memory.id,
                candidate.relation.as_str(),
                candidate.weight
            ],
        )?;
        created += inserted;
    }

    Ok(created)
}

/// Run all three heuristics, in signal order
fn collect_candidates(
    conn: &Connection,
    memory: &Memory,
    min_tag_overlap: i64,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    shared_tag_candidates(conn, memory, min_tag_overlap, &mut candidates)?;
    content_similarity_candidates(conn, memory, &mut candidates)?;
    temporal_candidates(conn, memory, &mut candidates)?;
    Ok(candidates)
}

/// Peers sharing at least `min_overlap` tags, best overlap first
fn shared_tag_candidates(
    conn: &Connection,
    memory: &Memory,
    min_overlap: i64,
    out: &mut Vec<Candidate>,
) -> Result<()> {
    // The inference threshold also requires the new memory itself to carry
    // at least two tags; the gentler suggestion threshold requires one.
    if (memory.tags.len() as i64) < min_overlap.max(1) {
        return Ok(());
    }

    let placeholders = vec!["?"; memory.tags.len()].join(", ");
    let sql = format!(
        "SELECT {}, COUNT(*) AS shared \
         FROM memories m, json_each(m.tags) jt \
         WHERE m.id != ? AND m.project = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
         AND jt.value IN ({}) \
         GROUP BY m.id HAVING shared >= ? \
         ORDER BY shared DESC LIMIT ?",
        MEMORY_COLUMNS, placeholders
    );

    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(memory.id.clone()),
        Box::new(memory.project.clone()),
    ];
    for tag in &memory.tags {
        params.push(Box::new(tag.clone()));
    }
    params.push(Box::new(min_overlap));
    params.push(Box::new(SHARED_TAG_CANDIDATES));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;
    while let Some(row) = rows.next()? {
        let shared: i64 = row.get("shared")?;
        out.push(Candidate {
            memory: memory_from_row(row)?,
            relation: Relation::Related,
            weight: (shared as f64 * SHARED_TAG_WEIGHT).min(1.0),
            reason: SuggestReason::SharedTags,
        });
    }

    Ok(())
}

/// Peers whose indexed text matches the memory's leading tokens
fn content_similarity_candidates(
    conn: &Connection,
    memory: &Memory,
    out: &mut Vec<Candidate>,
) -> Result<()> {
    let probe: Vec<&str> = memory
        .content
        .split_whitespace()
        .take(CONTENT_PROBE_TOKENS)
        .collect();
    let Some(match_expr) = compile_fts_query(&probe.join(" "), MatchMode::Any, 10) else {
        return Ok(());
    };

    let sql = format!(
        "SELECT {}, memories_fts.rank AS rank \
         FROM memories_fts JOIN memories m ON m.rowid = memories_fts.rowid \
         WHERE memories_fts MATCH ? AND m.id != ? AND m.project = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
         ORDER BY memories_fts.rank LIMIT ?",
        MEMORY_COLUMNS
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![
        match_expr,
        memory.id,
        memory.project,
        CONTENT_CANDIDATES as i64
    ])?;
    while let Some(row) = rows.next()? {
        let rank: f64 = row.get("rank")?;
        if rank >= CONTENT_RANK_THRESHOLD {
            continue;
        }
        out.push(Candidate {
            memory: memory_from_row(row)?,
            relation: Relation::References,
            weight: (rank.abs() / 10.0).clamp(CONTENT_WEIGHT_MIN, CONTENT_WEIGHT_MAX),
            reason: SuggestReason::ContentSimilarity,
        });
    }

    Ok(())
}

/// Same-category peers created within the temporal window, closest first
fn temporal_candidates(conn: &Connection, memory: &Memory, out: &mut Vec<Candidate>) -> Result<()> {
    let sql = format!(
        "SELECT {} FROM memories m \
         WHERE m.id != ? AND m.project = ? AND m.category = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
         AND ABS(julianday(m.created_at) - julianday(?)) * 24.0 <= ? \
         ORDER BY ABS(julianday(m.created_at) - julianday(?)) ASC LIMIT ?",
        MEMORY_COLUMNS
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![
        memory.id,
        memory.project,
        memory.category,
        memory.created_at,
        TEMPORAL_WINDOW_HOURS,
        memory.created_at,
        TEMPORAL_CANDIDATES
    ])?;
    while let Some(row) = rows.next()? {
        out.push(Candidate {
            memory: memory_from_row(row)?,
            relation: Relation::Related,
            weight: TEMPORAL_WEIGHT,
            reason: SuggestReason::TemporalProximity,
        });
    }

    Ok(())
}

/// Non-mutating analogue of inference
///
/// Analyzes the given memory, or up to five project orphans when no id is
/// given. Uses the gentler shared-tag threshold, skips peers that already
/// have a link with the analyzed memory in either direction, deduplicates
/// per pair, and caps the result.
pub fn suggest_links(conn: &Connection, options: &SuggestOptions) -> Result<Vec<LinkSuggestion>> {
    let limit = options.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
    let project = crate::normalize::normalize_project(options.project.as_deref());

    let targets: Vec<Memory> = match &options.id {
        Some(id) => crate::storage::queries::get_memory(conn, id)?
            .into_iter()
            .collect(),
        None => find_orphans(conn, &project, ORPHAN_BATCH)?,
    };

    let mut seen: HashSet<(MemoryId, MemoryId)> = HashSet::new();
    let mut suggestions = Vec::new();

    'targets: for target in &targets {
        for candidate in collect_candidates(conn, target, 1)? {
            if suggestions.len() >= limit {
                break 'targets;
            }
            if !seen.insert((target.id.clone(), candidate.memory.id.clone())) {
                continue;
            }
            if has_link_either_direction(conn, &target.id, &candidate.memory.id)? {
                continue;
            }

            let peer = candidate.memory;
            suggestions.push(LinkSuggestion {
                from_id: target.id.clone(),
                to_id: peer.id,
                preview: peer.content.chars().take(SUGGESTION_PREVIEW_CHARS).collect(),
                category: peer.category,
                tags: peer.tags,
                suggested_relation: candidate.relation,
                weight: candidate.weight,
                reason: candidate.reason,
            });
        }
    }

    Ok(suggestions)
}

/// Live project memories with no incoming and no outgoing edges
fn find_orphans(conn: &Connection, project: &str, limit: i64) -> Result<Vec<Memory>> {
    let sql = format!(
        "SELECT {} FROM memories m \
         WHERE m.project = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
         AND NOT EXISTS (SELECT 1 FROM memory_links l WHERE l.from_id = m.id OR l.to_id = m.id) \
         ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?",
        MEMORY_COLUMNS
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let orphans = stmt
        .query_map(params![project, limit], memory_from_row)?
        .collect::<rusqlite::Result<_>>()?;
    Ok(orphans)
}

fn has_link_either_direction(conn: &Connection, a: &str, b: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT EXISTS (
            SELECT 1 FROM memory_links
            WHERE (from_id = ? AND to_id = ?) OR (from_id = ? AND to_id = ?)
        )",
    )?;
    let exists: bool = stmt.query_row(params![a, b, b, a], |row| row.get(0))?;
    Ok(exists)
}
