//! Graph export and textual diagram rendering
//!
//! Assembles the project's edge and node sets and renders a deterministic
//! Mermaid `flowchart LR` diagram for direct embedding in agent output.

use rusqlite::{Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::link_from_row;
use crate::error::Result;
use crate::normalize::normalize_project;
use crate::storage::queries::{memory_from_row, MEMORY_COLUMNS};
use crate::types::{Link, MemoryId, Relation};

/// Preview length of node content in the node listing
const NODE_PREVIEW_CHARS: usize = 60;
/// Preview length of node content inside diagram labels
const LABEL_PREVIEW_CHARS: usize = 40;

/// Options for `get_graph`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Also list live project memories without any edges
    #[serde(default)]
    pub include_orphans: bool,
    pub relation: Option<Relation>,
    pub project: Option<String>,
}

/// A node of the exported graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: MemoryId,
    /// Single-line content preview, newlines collapsed
    pub preview: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// The exported graph: nodes, edges, and the rendered diagram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Link>,
    pub diagram: String,
}

/// Export the project graph
///
/// Edges are loaded newest first and only when both endpoints share the
/// project; the node set covers every endpoint, plus all remaining live
/// project memories when `include_orphans` is set.
pub fn get_graph(conn: &Connection, options: &GraphOptions) -> Result<MemoryGraph> {
    let project = normalize_project(options.project.as_deref());

    let mut sql = "SELECT l.from_id, l.to_id, l.relation, l.weight, l.auto_generated, l.created_at \
                   FROM memory_links l \
                   JOIN memories mf ON mf.id = l.from_id \
                   JOIN memories mt ON mt.id = l.to_id \
                   WHERE mf.project = ? AND mt.project = ?"
        .to_string();
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(project.clone()), Box::new(project.clone())];
    if let Some(relation) = options.relation {
        sql.push_str(" AND l.relation = ?");
        params.push(Box::new(relation.as_str()));
    }
    sql.push_str(" ORDER BY l.created_at DESC");

    let mut stmt = conn.prepare_cached(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|b| b.as_ref()).collect();
    let edges: Vec<Link> = stmt
        .query_map(param_refs.as_slice(), link_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    let mut node_ids: Vec<MemoryId> = Vec::new();
    let mut seen: HashSet<MemoryId> = HashSet::new();
    for edge in &edges {
        if seen.insert(edge.from_id.clone()) {
            node_ids.push(edge.from_id.clone());
        }
        if seen.insert(edge.to_id.clone()) {
            node_ids.push(edge.to_id.clone());
        }
    }

    let mut nodes: Vec<GraphNode> = Vec::new();
    for id in &node_ids {
        // Endpoints may be expired; they still anchor their edges
        if let Some(memory) = crate::storage::queries::get_memory_any(conn, id)? {
            nodes.push(GraphNode {
                id: memory.id,
                preview: single_line_preview(&memory.content, NODE_PREVIEW_CHARS),
                category: memory.category,
                tags: memory.tags,
            });
        }
    }

    if options.include_orphans {
        let sql = format!(
            "SELECT {} FROM memories m WHERE m.project = ? \
             AND (m.expires_at IS NULL OR m.expires_at > datetime('now')) \
             ORDER BY m.created_at DESC, m.rowid DESC",
            MEMORY_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query([&project])?;
        while let Some(row) = rows.next()? {
            let memory = memory_from_row(row)?;
            if seen.insert(memory.id.clone()) {
                nodes.push(GraphNode {
                    id: memory.id,
                    preview: single_line_preview(&memory.content, NODE_PREVIEW_CHARS),
                    category: memory.category,
                    tags: memory.tags,
                });
            }
        }
    }

    let diagram = render_diagram(&nodes, &edges);

    Ok(MemoryGraph {
        nodes,
        edges,
        diagram,
    })
}

/// Render the deterministic Mermaid diagram
pub fn render_diagram(nodes: &[GraphNode], edges: &[Link]) -> String {
    let mut out = String::from("flowchart LR\n");

    if nodes.is_empty() && edges.is_empty() {
        out.push_str("    empty[\"no memories\"]\n");
        return out;
    }

    for node in nodes {
        out.push_str(&format!(
            "    {}[\"{} ({})\"]\n",
            short_id(&node.id),
            escape_label(&single_line_preview(&node.preview, LABEL_PREVIEW_CHARS)),
            node.category
        ));
    }

    for edge in edges {
        out.push_str(&format!(
            "    {} -- {} --> {}\n",
            short_id(&edge.from_id),
            edge.relation.as_str(),
            short_id(&edge.to_id)
        ));
    }

    out
}

/// Diagram node name: "n" + first 8 hex chars of the id, dashes removed
fn short_id(id: &str) -> String {
    let hex: String = id.chars().filter(|c| *c != '-').take(8).collect();
    format!("n{}", hex)
}

/// Collapse newlines and truncate to a single-line preview
fn single_line_preview(content: &str, max_chars: usize) -> String {
    let collapsed: String = content
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    collapsed.trim().chars().take(max_chars).collect()
}

/// Label escaping: double quotes become single, angle brackets become space
fn escape_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '<' | '>' => ' ',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, preview: &str, category: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            preview: preview.to_string(),
            category: category.to_string(),
            tags: vec![],
        }
    }

    #[test]
    fn test_empty_graph_renders_placeholder() {
        let diagram = render_diagram(&[], &[]);
        assert_eq!(diagram, "flowchart LR\n    empty[\"no memories\"]\n");
    }

    #[test]
    fn test_short_id_strips_dashes() {
        assert_eq!(short_id("123e4567-e89b-12d3-a456-426614174000"), "n123e4567");
        assert_eq!(short_id("ab-cd-ef-12-34"), "nabcdef12");
    }

    #[test]
    fn test_labels_are_escaped() {
        assert_eq!(escape_label("say \"hi\" <now>"), "say 'hi'  now ");
    }

    #[test]
    fn test_diagram_declares_nodes_and_edges() {
        let nodes = vec![
            node("11111111-aaaa-0000-0000-000000000000", "first note", "general"),
            node("22222222-bbbb-0000-0000-000000000000", "second note", "code"),
        ];
        let edges = vec![Link {
            from_id: nodes[0].id.clone(),
            to_id: nodes[1].id.clone(),
            relation: Relation::Caused,
            weight: 1.0,
            auto_generated: false,
            created_at: "2026-01-01 00:00:00".to_string(),
        }];

        let diagram = render_diagram(&nodes, &edges);
        assert!(diagram.starts_with("flowchart LR\n"));
        assert!(diagram.contains("n11111111[\"first note (general)\"]"));
        assert!(diagram.contains("n22222222[\"second note (code)\"]"));
        assert!(diagram.contains("n11111111 -- caused --> n22222222"));
    }
}
