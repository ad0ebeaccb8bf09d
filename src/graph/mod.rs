//! Directed typed edges between memories
//!
//! Edges are keyed by `(from_id, to_id)` and carry a relation, a clamped
//! weight, and an auto-generated flag. Multi-hop traversal is an explicit
//! breadth-first loop with a visited set, so cycles are suppressed and each
//! reachable node keeps its minimum depth.

pub mod autolink;
pub mod export;

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{EngramError, Result};
use crate::storage::queries::{get_memory, memory_from_row, MEMORY_COLUMNS};
use crate::types::{Direction, Link, Memory, MemoryId, Relation, RelatedMemory};

/// Default page size for raw edge listings
pub const DEFAULT_LINK_LIMIT: i64 = 50;

/// Default and maximum traversal depth
pub const DEFAULT_TRAVERSAL_DEPTH: u32 = 3;
pub const MAX_TRAVERSAL_DEPTH: u32 = 5;

/// Default result cap for traversal
pub const DEFAULT_TRAVERSAL_LIMIT: i64 = 50;

/// Parse a link from a database row
pub fn link_from_row(row: &Row) -> rusqlite::Result<Link> {
    let relation_str: String = row.get("relation")?;
    let auto_generated: i64 = row.get("auto_generated")?;

    Ok(Link {
        from_id: row.get("from_id")?,
        to_id: row.get("to_id")?,
        relation: relation_str.parse().unwrap_or_default(),
        weight: row.get("weight")?,
        auto_generated: auto_generated != 0,
        created_at: row.get("created_at")?,
    })
}

/// Upsert an edge; the relation, weight, and flag replace on conflict
///
/// Self-loops are rejected. Weight is clamped to [0.0, 1.0]; manual links
/// default to 1.0.
pub fn link_memories(
    conn: &Connection,
    from_id: &str,
    to_id: &str,
    relation: Relation,
    weight: Option<f64>,
    auto_generated: bool,
) -> Result<Link> {
    if from_id == to_id {
        return Err(EngramError::InvalidInput(
            "a memory cannot link to itself".to_string(),
        ));
    }
    let weight = weight.unwrap_or(1.0).clamp(0.0, 1.0);

    conn.execute(
        "INSERT INTO memory_links (from_id, to_id, relation, weight, auto_generated)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(from_id, to_id) DO UPDATE SET
             relation = excluded.relation,
             weight = excluded.weight,
             auto_generated = excluded.auto_generated",
        params![from_id, to_id, relation.as_str(), weight, auto_generated as i64],
    )?;

    get_link(conn, from_id, to_id)?.ok_or_else(|| {
        EngramError::Storage(format!("freshly upserted link {} -> {} vanished", from_id, to_id))
    })
}

/// Change the relation of an existing edge
pub fn update_link(conn: &Connection, from_id: &str, to_id: &str, relation: Relation) -> Result<Link> {
    let changed = conn.execute(
        "UPDATE memory_links SET relation = ? WHERE from_id = ? AND to_id = ?",
        params![relation.as_str(), from_id, to_id],
    )?;
    if changed == 0 {
        return Err(EngramError::NotFound(format!("{} -> {}", from_id, to_id)));
    }

    get_link(conn, from_id, to_id)?
        .ok_or_else(|| EngramError::NotFound(format!("{} -> {}", from_id, to_id)))
}

/// Remove an edge; returns whether one existed
pub fn unlink_memories(conn: &Connection, from_id: &str, to_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM memory_links WHERE from_id = ? AND to_id = ?",
        params![from_id, to_id],
    )?;
    Ok(changed > 0)
}

/// Get a single edge
pub fn get_link(conn: &Connection, from_id: &str, to_id: &str) -> Result<Option<Link>> {
    let mut stmt = conn.prepare_cached(
        "SELECT from_id, to_id, relation, weight, auto_generated, created_at
         FROM memory_links WHERE from_id = ? AND to_id = ?",
    )?;
    let link = stmt
        .query_row(params![from_id, to_id], link_from_row)
        .optional()?;
    Ok(link)
}

/// Query for 1-hop neighbors
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedQuery {
    pub id: MemoryId,
    pub relation: Option<Relation>,
    #[serde(default)]
    pub direction: Direction,
}

/// Edges of a node joined to the live peer memory
///
/// `direction = both` concatenates outgoing then incoming.
pub fn get_related(conn: &Connection, query: &RelatedQuery) -> Result<Vec<RelatedMemory>> {
    let mut results = Vec::new();
    match query.direction {
        Direction::From => {
            related_on_side(conn, query, Direction::From, &mut results)?;
        }
        Direction::To => {
            related_on_side(conn, query, Direction::To, &mut results)?;
        }
        Direction::Both => {
            related_on_side(conn, query, Direction::From, &mut results)?;
            related_on_side(conn, query, Direction::To, &mut results)?;
        }
    }
    Ok(results)
}

fn related_on_side(
    conn: &Connection,
    query: &RelatedQuery,
    side: Direction,
    results: &mut Vec<RelatedMemory>,
) -> Result<()> {
    // Peer sits on the opposite end of the queried side
    let (anchor, peer) = match side {
        Direction::From => ("from_id", "to_id"),
        Direction::To => ("to_id", "from_id"),
        Direction::Both => unreachable!("both is expanded by the caller"),
    };

    let mut sql = format!(
        "SELECT {}, l.relation, l.weight, l.auto_generated, l.created_at AS link_created_at \
         FROM memory_links l JOIN memories m ON m.id = l.{} \
         WHERE l.{} = ? \
         AND (m.expires_at IS NULL OR m.expires_at > datetime('now'))",
        MEMORY_COLUMNS, peer, anchor
    );
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(query.id.clone())];
    if let Some(relation) = query.relation {
        sql.push_str(" AND l.relation = ?");
        params.push(Box::new(relation.as_str()));
    }
    sql.push_str(" ORDER BY l.created_at DESC");

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let mut rows = stmt.query(param_refs.as_slice())?;
    while let Some(row) = rows.next()? {
        let relation_str: String = row.get("relation")?;
        let auto_generated: i64 = row.get("auto_generated")?;
        results.push(RelatedMemory {
            memory: memory_from_row(row)?,
            relation: relation_str.parse().unwrap_or_default(),
            direction: side,
            weight: row.get("weight")?,
            auto_generated: auto_generated != 0,
            created_at: row.get("link_created_at")?,
        });
    }

    Ok(())
}

/// Query for raw edge listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkQuery {
    pub from: Option<MemoryId>,
    pub to: Option<MemoryId>,
    pub relation: Option<Relation>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A page of edges with the filtered total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkPage {
    pub links: Vec<Link>,
    pub total: i64,
}

/// Raw edge listing ordered by edge creation time, newest first
pub fn list_links(conn: &Connection, query: &LinkQuery) -> Result<LinkPage> {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(from) = &query.from {
        clauses.push("from_id = ?");
        params.push(Box::new(from.clone()));
    }
    if let Some(to) = &query.to {
        clauses.push("to_id = ?");
        params.push(Box::new(to.clone()));
    }
    if let Some(relation) = query.relation {
        clauses.push("relation = ?");
        params.push(Box::new(relation.as_str()));
    }

    let mut sql = "SELECT from_id, to_id, relation, weight, auto_generated, created_at, \
                   COUNT(*) OVER () AS total FROM memory_links"
        .to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    params.push(Box::new(query.limit.unwrap_or(DEFAULT_LINK_LIMIT).max(0)));
    params.push(Box::new(query.offset.unwrap_or(0).max(0)));

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();

    let mut total = 0i64;
    let mut links = Vec::new();
    let mut rows = stmt.query(param_refs.as_slice())?;
    while let Some(row) = rows.next()? {
        total = row.get("total")?;
        links.push(link_from_row(row)?);
    }

    Ok(LinkPage { links, total })
}

/// Options for multi-hop traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalOptions {
    pub id: MemoryId,
    /// Maximum hop count, 1..=5
    pub max_depth: Option<u32>,
    pub relation: Option<Relation>,
    pub limit: Option<i64>,
}

/// A memory reached by traversal, at its minimum hop count from the origin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepRelated {
    pub memory: Memory,
    pub depth: u32,
}

/// Breadth-first traversal of outgoing edges
///
/// Scoped to the origin's project; the origin itself is never emitted and
/// each reachable id appears exactly once at its minimum depth. Results
/// are ordered by depth ascending and capped at the limit.
pub fn get_related_deep(conn: &Connection, options: &TraversalOptions) -> Result<Vec<DeepRelated>> {
    let max_depth = options.max_depth.unwrap_or(DEFAULT_TRAVERSAL_DEPTH);
    if !(1..=MAX_TRAVERSAL_DEPTH).contains(&max_depth) {
        return Err(EngramError::InvalidInput(format!(
            "max depth must be between 1 and {}, got {}",
            MAX_TRAVERSAL_DEPTH, max_depth
        )));
    }
    let limit = options.limit.unwrap_or(DEFAULT_TRAVERSAL_LIMIT).max(0) as usize;

    let origin = get_memory(conn, &options.id)?
        .ok_or_else(|| EngramError::NotFound(options.id.clone()))?;

    let mut visited: HashSet<MemoryId> = HashSet::new();
    visited.insert(origin.id.clone());

    let mut depths: HashMap<MemoryId, u32> = HashMap::new();
    let mut order: Vec<MemoryId> = Vec::new();
    let mut frontier: Vec<MemoryId> = vec![origin.id.clone()];

    for depth in 1..=max_depth {
        if frontier.is_empty() {
            break;
        }

        let placeholders = vec!["?"; frontier.len()].join(", ");
        let mut sql = format!(
            "SELECT l.to_id FROM memory_links l JOIN memories m ON m.id = l.to_id \
             WHERE l.from_id IN ({}) AND m.project = ? \
             AND (m.expires_at IS NULL OR m.expires_at > datetime('now'))",
            placeholders
        );
        let mut params: Vec<Box<dyn ToSql>> = frontier
            .iter()
            .map(|id| Box::new(id.clone()) as Box<dyn ToSql>)
            .collect();
        params.push(Box::new(origin.project.clone()));
        if let Some(relation) = options.relation {
            sql.push_str(" AND l.relation = ?");
            params.push(Box::new(relation.as_str()));
        }

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let targets: Vec<MemoryId> = stmt
            .query_map(param_refs.as_slice(), |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;

        let mut next_frontier = Vec::new();
        for target in targets {
            if visited.insert(target.clone()) {
                depths.insert(target.clone(), depth);
                order.push(target.clone());
                next_frontier.push(target);
            }
        }
        frontier = next_frontier;
    }

    // BFS discovery order is already depth-ascending
    let reachable: Vec<MemoryId> = order.into_iter().take(limit).collect();
    let memories = crate::storage::queries::get_memories(conn, &reachable)?;
    let by_id: HashMap<MemoryId, Memory> = memories.into_iter().map(|m| (m.id.clone(), m)).collect();

    Ok(reachable
        .into_iter()
        .filter_map(|id| {
            let depth = depths.get(&id).copied()?;
            by_id.get(&id).cloned().map(|memory| DeepRelated { memory, depth })
        })
        .collect())
}
