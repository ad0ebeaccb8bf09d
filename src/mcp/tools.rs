//! MCP tool definitions for Engram

use super::protocol::ToolDefinition;

/// All tool definitions: (name, description, input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    // Memory CRUD
    (
        "save_memory",
        "Store a new memory with tags, metadata, category, project, and optional expiry. Related memories are linked automatically unless auto_link is false.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The content to remember"},
                "category": {"type": "string", "description": "Category token (lowercased; default 'general')"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Tags for categorization"},
                "metadata": {"type": "object", "description": "Additional metadata as key-value pairs"},
                "project": {"type": "string", "description": "Project namespace (default from ENGRAM_PROJECT)"},
                "expires_at": {"type": "string", "description": "Absolute expiry timestamp (UTC). Omit for permanent storage."},
                "auto_link": {"type": "boolean", "default": true, "description": "Infer links to related memories after saving"},
                "dedup": {"type": "boolean", "default": false, "description": "Return an existing memory with identical content in the same project instead of inserting"}
            },
            "required": ["content"]
        }"#,
    ),
    (
        "save_memories",
        "Store several memories in one transaction",
        r#"{
            "type": "object",
            "properties": {
                "memories": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "category": {"type": "string"},
                            "tags": {"type": "array", "items": {"type": "string"}},
                            "metadata": {"type": "object"},
                            "project": {"type": "string"},
                            "expires_at": {"type": "string"},
                            "auto_link": {"type": "boolean", "default": true},
                            "dedup": {"type": "boolean", "default": false}
                        },
                        "required": ["content"]
                    }
                }
            },
            "required": ["memories"]
        }"#,
    ),
    (
        "get_memory",
        "Retrieve a live memory by its id",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory id (UUID)"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "get_memories",
        "Retrieve several live memories by id; misses are dropped",
        r#"{
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["ids"]
        }"#,
    ),
    (
        "update_memory",
        "Update an existing memory. Omitted fields keep their values; tags and metadata replace wholesale; expires_at accepts null to clear.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "content": {"type": "string"},
                "category": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "metadata": {"type": "object"},
                "project": {"type": "string"},
                "expires_at": {"type": ["string", "null"], "description": "New expiry, or null to clear"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "update_memories",
        "Update several memories in one transaction; missing ids are reported, not raised",
        r#"{
            "type": "object",
            "properties": {
                "updates": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "category": {"type": "string"},
                            "tags": {"type": "array", "items": {"type": "string"}},
                            "metadata": {"type": "object"},
                            "project": {"type": "string"},
                            "expires_at": {"type": ["string", "null"]}
                        },
                        "required": ["id"]
                    }
                }
            },
            "required": ["updates"]
        }"#,
    ),
    (
        "delete_memory",
        "Delete a memory; incident links cascade and the history trail keeps the final snapshot",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "delete_memories",
        "Delete several memories in one transaction; missing ids are reported, not raised",
        r#"{
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["ids"]
        }"#,
    ),
    // Listing & search
    (
        "list_memories",
        "List live memories with filters, sorting, and pagination; returns the filtered total",
        r#"{
            "type": "object",
            "properties": {
                "category": {"type": "string"},
                "tag": {"type": "string"},
                "project": {"type": "string"},
                "metadata_key": {"type": "string", "description": "Metadata key to filter on (requires metadata_value)"},
                "metadata_value": {"description": "Value the metadata key must equal"},
                "created_after": {"type": "string"},
                "created_before": {"type": "string"},
                "updated_after": {"type": "string"},
                "updated_before": {"type": "string"},
                "sort": {"type": "string", "enum": ["created_at_desc", "created_at_asc", "updated_at_desc"], "default": "created_at_desc"},
                "limit": {"type": "integer", "default": 50},
                "offset": {"type": "integer", "default": 0}
            }
        }"#,
    ),
    (
        "search_memories",
        "Full-text search over content, category, and tags with any/all/near modes",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "mode": {"type": "string", "enum": ["any", "all", "near"], "default": "any"},
                "near_distance": {"type": "integer", "minimum": 1, "maximum": 100, "default": 10},
                "category": {"type": "string"},
                "tag": {"type": "string"},
                "project": {"type": "string"},
                "metadata_key": {"type": "string"},
                "metadata_value": {},
                "created_after": {"type": "string"},
                "created_before": {"type": "string"},
                "updated_after": {"type": "string"},
                "updated_before": {"type": "string"},
                "sort": {"type": "string", "enum": ["created_at_desc", "created_at_asc", "updated_at_desc"], "description": "Override the default rank ordering"},
                "limit": {"type": "integer", "default": 50},
                "offset": {"type": "integer", "default": 0}
            },
            "required": ["query"]
        }"#,
    ),
    // Aggregates
    (
        "get_context_snapshot",
        "Compact per-category snapshot of a project: totals, recent entries, and a tag index",
        r#"{
            "type": "object",
            "properties": {
                "recent_per_category": {"type": "integer", "default": 3},
                "preview_len": {"type": "integer", "description": "Truncate previewed content to this many characters"},
                "include_tags_index": {"type": "boolean", "default": true},
                "project": {"type": "string"}
            }
        }"#,
    ),
    (
        "get_stats",
        "Statistics over live memories: totals, categories, top tags, oldest/newest, averages",
        r#"{
            "type": "object",
            "properties": {
                "project": {"type": "string"}
            }
        }"#,
    ),
    // Projects
    (
        "list_projects",
        "List project namespaces with live memory counts",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "migrate_to_project",
        "Move every live memory carrying a tag into another project",
        r#"{
            "type": "object",
            "properties": {
                "tag": {"type": "string"},
                "project": {"type": "string"}
            },
            "required": ["tag", "project"]
        }"#,
    ),
    // Graph
    (
        "link_memories",
        "Create or update a directed link between two memories",
        r#"{
            "type": "object",
            "properties": {
                "from_id": {"type": "string"},
                "to_id": {"type": "string"},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"], "default": "related"},
                "weight": {"type": "number", "minimum": 0, "maximum": 1, "default": 1.0}
            },
            "required": ["from_id", "to_id"]
        }"#,
    ),
    (
        "unlink_memories",
        "Remove a link; reports whether one existed",
        r#"{
            "type": "object",
            "properties": {
                "from_id": {"type": "string"},
                "to_id": {"type": "string"}
            },
            "required": ["from_id", "to_id"]
        }"#,
    ),
    (
        "update_link",
        "Change the relation of an existing link",
        r#"{
            "type": "object",
            "properties": {
                "from_id": {"type": "string"},
                "to_id": {"type": "string"},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"]}
            },
            "required": ["from_id", "to_id", "relation"]
        }"#,
    ),
    (
        "get_related",
        "Direct neighbors of a memory with relation and direction filters",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"]},
                "direction": {"type": "string", "enum": ["from", "to", "both"], "default": "both"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "get_related_deep",
        "Multi-hop traversal of outgoing links, cycle-safe, scoped to the origin's project",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "max_depth": {"type": "integer", "minimum": 1, "maximum": 5, "default": 3},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"]},
                "limit": {"type": "integer", "default": 50}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "get_links",
        "Raw link listing with endpoint and relation filters",
        r#"{
            "type": "object",
            "properties": {
                "from": {"type": "string"},
                "to": {"type": "string"},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"]},
                "limit": {"type": "integer", "default": 50},
                "offset": {"type": "integer", "default": 0}
            }
        }"#,
    ),
    (
        "get_graph",
        "Export the project graph as nodes, edges, and a Mermaid diagram",
        r#"{
            "type": "object",
            "properties": {
                "include_orphans": {"type": "boolean", "default": false},
                "relation": {"type": "string", "enum": ["caused", "references", "supersedes", "related"]},
                "project": {"type": "string"}
            }
        }"#,
    ),
    (
        "suggest_links",
        "Suggest links for a memory, or for project orphans when no id is given; never mutates",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "project": {"type": "string"},
                "limit": {"type": "integer", "default": 20}
            }
        }"#,
    ),
    // History
    (
        "get_history",
        "Audit trail of a memory, newest first",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "limit": {"type": "integer", "default": 50},
                "offset": {"type": "integer", "default": 0}
            },
            "required": ["memory_id"]
        }"#,
    ),
    (
        "restore_memory",
        "Restore a memory to a recorded snapshot; the restore itself is audited",
        r#"{
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "history_id": {"type": "integer"}
            },
            "required": ["memory_id", "history_id"]
        }"#,
    ),
    // Import/export
    (
        "export_memories",
        "Dump every memory, expired ones included",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "import_memories",
        "Import memories in one transaction. Mode 'insert' always generates fresh ids; 'upsert' updates rows whose id exists.",
        r#"{
            "type": "object",
            "properties": {
                "memories": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "category": {"type": "string"},
                            "tags": {"type": "array", "items": {"type": "string"}},
                            "metadata": {"type": "object"},
                            "project": {"type": "string"},
                            "expires_at": {"type": ["string", "null"]}
                        }
                    }
                },
                "mode": {"type": "string", "enum": ["insert", "upsert"], "default": "insert"}
            },
            "required": ["memories"]
        }"#,
    ),
    // Maintenance
    (
        "rename_tag",
        "Rename a tag across a project (or everywhere), deduplicating the tag arrays",
        r#"{
            "type": "object",
            "properties": {
                "old_tag": {"type": "string"},
                "new_tag": {"type": "string"},
                "project": {"type": "string"}
            },
            "required": ["old_tag", "new_tag"]
        }"#,
    ),
    (
        "purge_expired",
        "Physically delete every expired memory; each deletion is audited",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "db_maintenance",
        "Run an integrity check and a WAL checkpoint",
        r#"{
            "type": "object",
            "properties": {
                "mode": {"type": "string", "enum": ["PASSIVE", "FULL", "RESTART", "TRUNCATE"], "default": "PASSIVE"}
            }
        }"#,
    ),
    (
        "backup",
        "Write a timestamped physical copy of the database beside it",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
];

/// Materialize the tool table for a tools/list response
pub fn tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schemas_parse() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), TOOL_DEFINITIONS.len());
    }

    #[test]
    fn test_tool_names_are_unique() {
        let mut names: Vec<&str> = TOOL_DEFINITIONS.iter().map(|(n, _, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TOOL_DEFINITIONS.len());
    }
}
