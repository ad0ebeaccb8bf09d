//! End-to-end tests for the graph engine: links, traversal, inference,
//! suggestions, and graph export.

use pretty_assertions::assert_eq;

use engram::graph::autolink::{suggest_links, SuggestOptions, SuggestReason};
use engram::graph::export::{get_graph, GraphOptions};
use engram::graph::{
    get_link, get_related, get_related_deep, link_memories, list_links, unlink_memories,
    update_link, LinkQuery, RelatedQuery, TraversalOptions,
};
use engram::storage::queries::{create_memory, delete_memory};
use engram::storage::Storage;
use engram::types::*;
use engram::EngramError;

fn open() -> Storage {
    Storage::open_in_memory().unwrap()
}

fn save(storage: &Storage, input: CreateMemoryInput) -> Memory {
    storage
        .with_transaction(|conn| create_memory(conn, &input))
        .unwrap()
        .memory
}

fn quiet(content: &str) -> CreateMemoryInput {
    CreateMemoryInput {
        content: content.to_string(),
        auto_link: false,
        ..Default::default()
    }
}

fn link(storage: &Storage, from: &Memory, to: &Memory, relation: Relation) -> Link {
    storage
        .with_transaction(|conn| link_memories(conn, &from.id, &to.id, relation, None, false))
        .unwrap()
}

// ============================================================================
// LINK CRUD
// ============================================================================

#[test]
fn test_link_defaults_and_upsert() {
    let storage = open();
    let a = save(&storage, quiet("memory a"));
    let b = save(&storage, quiet("memory b"));

    let created = link(&storage, &a, &b, Relation::Related);
    assert_eq!(created.relation, Relation::Related);
    assert_eq!(created.weight, 1.0);
    assert!(!created.auto_generated);

    // Upsert on the same pair replaces relation and weight
    let replaced = storage
        .with_transaction(|conn| {
            link_memories(conn, &a.id, &b.id, Relation::Caused, Some(0.5), false)
        })
        .unwrap();
    assert_eq!(replaced.relation, Relation::Caused);
    assert_eq!(replaced.weight, 0.5);

    let page = storage
        .with_connection(|conn| list_links(conn, &LinkQuery::default()))
        .unwrap();
    assert_eq!(page.total, 1);
}

#[test]
fn test_link_weight_is_clamped() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));

    let heavy = storage
        .with_transaction(|conn| {
            link_memories(conn, &a.id, &b.id, Relation::Related, Some(5.0), false)
        })
        .unwrap();
    assert_eq!(heavy.weight, 1.0);

    let light = storage
        .with_transaction(|conn| {
            link_memories(conn, &a.id, &c.id, Relation::Related, Some(-2.0), false)
        })
        .unwrap();
    assert_eq!(light.weight, 0.0);
}

#[test]
fn test_self_loop_is_rejected() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let err = storage
        .with_transaction(|conn| {
            link_memories(conn, &a.id, &a.id, Relation::Related, None, false)
        })
        .unwrap_err();
    assert!(matches!(err, EngramError::InvalidInput(_)));
}

#[test]
fn test_link_to_missing_memory_is_an_integrity_error() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let err = storage
        .with_transaction(|conn| {
            link_memories(conn, &a.id, "missing", Relation::Related, None, false)
        })
        .unwrap_err();
    assert!(matches!(err, EngramError::Integrity(_)));
}

#[test]
fn test_update_link_and_missing_edge() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    link(&storage, &a, &b, Relation::Related);

    let updated = storage
        .with_transaction(|conn| update_link(conn, &a.id, &b.id, Relation::Supersedes))
        .unwrap();
    assert_eq!(updated.relation, Relation::Supersedes);

    let err = storage
        .with_transaction(|conn| update_link(conn, &b.id, &a.id, Relation::Caused))
        .unwrap_err();
    assert!(matches!(err, EngramError::NotFound(_)));
}

#[test]
fn test_unlink_reports_whether_edge_existed() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    link(&storage, &a, &b, Relation::Related);

    let removed = storage
        .with_transaction(|conn| unlink_memories(conn, &a.id, &b.id))
        .unwrap();
    assert!(removed);

    let again = storage
        .with_transaction(|conn| unlink_memories(conn, &a.id, &b.id))
        .unwrap();
    assert!(!again);
}

#[test]
fn test_deleting_a_memory_cascades_its_edges() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Related);
    link(&storage, &c, &a, Relation::References);

    storage
        .with_transaction(|conn| delete_memory(conn, &a.id))
        .unwrap();

    assert!(storage
        .with_connection(|conn| get_link(conn, &a.id, &b.id))
        .unwrap()
        .is_none());
    assert!(storage
        .with_connection(|conn| get_link(conn, &c.id, &a.id))
        .unwrap()
        .is_none());

    let page = storage
        .with_connection(|conn| list_links(conn, &LinkQuery::default()))
        .unwrap();
    assert_eq!(page.total, 0);
}

// ============================================================================
// 1-HOP NEIGHBORS
// ============================================================================

#[test]
fn test_get_related_directions() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Caused);
    link(&storage, &c, &a, Relation::References);

    let outgoing = storage
        .with_connection(|conn| {
            get_related(
                conn,
                &RelatedQuery {
                    id: a.id.clone(),
                    relation: None,
                    direction: Direction::From,
                },
            )
        })
        .unwrap();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].memory.id, b.id);
    assert_eq!(outgoing[0].relation, Relation::Caused);

    let incoming = storage
        .with_connection(|conn| {
            get_related(
                conn,
                &RelatedQuery {
                    id: a.id.clone(),
                    relation: None,
                    direction: Direction::To,
                },
            )
        })
        .unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].memory.id, c.id);

    let both = storage
        .with_connection(|conn| {
            get_related(
                conn,
                &RelatedQuery {
                    id: a.id.clone(),
                    relation: None,
                    direction: Direction::Both,
                },
            )
        })
        .unwrap();
    assert_eq!(both.len(), 2);
    // Outgoing side first
    assert_eq!(both[0].memory.id, b.id);
    assert_eq!(both[1].memory.id, c.id);
}

#[test]
fn test_get_related_filters_by_relation() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Caused);
    link(&storage, &a, &c, Relation::References);

    let caused = storage
        .with_connection(|conn| {
            get_related(
                conn,
                &RelatedQuery {
                    id: a.id.clone(),
                    relation: Some(Relation::Caused),
                    direction: Direction::From,
                },
            )
        })
        .unwrap();
    assert_eq!(caused.len(), 1);
    assert_eq!(caused[0].memory.id, b.id);
}

// ============================================================================
// MULTI-HOP TRAVERSAL
// ============================================================================

#[test]
fn test_traversal_handles_cycles_and_minimum_depth() {
    let storage = open();
    let a = save(&storage, quiet("node a"));
    let b = save(&storage, quiet("node b"));
    let c = save(&storage, quiet("node c"));
    let d = save(&storage, quiet("node d"));

    link(&storage, &a, &b, Relation::Caused);
    link(&storage, &b, &c, Relation::References);
    link(&storage, &c, &d, Relation::Related);
    link(&storage, &d, &a, Relation::Related);

    let related = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: a.id.clone(),
                    max_depth: Some(5),
                    relation: None,
                    limit: None,
                },
            )
        })
        .unwrap();

    let mut found: Vec<(&str, u32)> = related
        .iter()
        .map(|r| (r.memory.id.as_str(), r.depth))
        .collect();
    found.sort_by_key(|(_, depth)| *depth);
    assert_eq!(
        found,
        vec![(b.id.as_str(), 1), (c.id.as_str(), 2), (d.id.as_str(), 3)]
    );

    // The origin never appears, even though d links back to it
    assert!(!related.iter().any(|r| r.memory.id == a.id));
}

#[test]
fn test_traversal_respects_depth_and_limit() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Related);
    link(&storage, &b, &c, Relation::Related);

    let shallow = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: a.id.clone(),
                    max_depth: Some(1),
                    relation: None,
                    limit: None,
                },
            )
        })
        .unwrap();
    assert_eq!(shallow.len(), 1);
    assert_eq!(shallow[0].memory.id, b.id);

    let capped = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: a.id.clone(),
                    max_depth: Some(5),
                    relation: None,
                    limit: Some(1),
                },
            )
        })
        .unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].depth, 1);
}

#[test]
fn test_traversal_validates_depth_and_origin() {
    let storage = open();
    let a = save(&storage, quiet("a"));

    for bad_depth in [0, 6] {
        let err = storage
            .with_connection(|conn| {
                get_related_deep(
                    conn,
                    &TraversalOptions {
                        id: a.id.clone(),
                        max_depth: Some(bad_depth),
                        relation: None,
                        limit: None,
                    },
                )
            })
            .unwrap_err();
        assert!(matches!(err, EngramError::InvalidInput(_)));
    }

    let err = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: "missing".to_string(),
                    max_depth: None,
                    relation: None,
                    limit: None,
                },
            )
        })
        .unwrap_err();
    assert!(matches!(err, EngramError::NotFound(_)));
}

#[test]
fn test_traversal_is_scoped_to_the_origins_project() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let elsewhere = save(
        &storage,
        CreateMemoryInput {
            content: "other project".to_string(),
            project: Some("work".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );
    link(&storage, &a, &b, Relation::Related);
    link(&storage, &b, &elsewhere, Relation::Related);

    let related = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: a.id.clone(),
                    max_depth: Some(5),
                    relation: None,
                    limit: None,
                },
            )
        })
        .unwrap();
    let ids: Vec<&str> = related.iter().map(|r| r.memory.id.as_str()).collect();
    assert_eq!(ids, vec![b.id.as_str()]);
}

#[test]
fn test_traversal_filters_by_relation() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Caused);
    link(&storage, &a, &c, Relation::Related);

    let caused_only = storage
        .with_connection(|conn| {
            get_related_deep(
                conn,
                &TraversalOptions {
                    id: a.id.clone(),
                    max_depth: Some(3),
                    relation: Some(Relation::Caused),
                    limit: None,
                },
            )
        })
        .unwrap();
    let ids: Vec<&str> = caused_only.iter().map(|r| r.memory.id.as_str()).collect();
    assert_eq!(ids, vec![b.id.as_str()]);
}

// ============================================================================
// LINK LISTING
// ============================================================================

#[test]
fn test_list_links_filters_and_total() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let b = save(&storage, quiet("b"));
    let c = save(&storage, quiet("c"));
    link(&storage, &a, &b, Relation::Caused);
    link(&storage, &a, &c, Relation::Related);
    link(&storage, &b, &c, Relation::Related);

    let from_a = storage
        .with_connection(|conn| {
            list_links(
                conn,
                &LinkQuery {
                    from: Some(a.id.clone()),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(from_a.total, 2);

    let related_only = storage
        .with_connection(|conn| {
            list_links(
                conn,
                &LinkQuery {
                    relation: Some(Relation::Related),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(related_only.total, 2);

    let paged = storage
        .with_connection(|conn| {
            list_links(
                conn,
                &LinkQuery {
                    limit: Some(2),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(paged.links.len(), 2);
    assert_eq!(paged.total, 3);
}

// ============================================================================
// AUTO-LINK INFERENCE
// ============================================================================

#[test]
fn test_auto_link_on_shared_tags() {
    let storage = open();
    let tags: Vec<String> = ["t1", "t2", "t3", "t4"].iter().map(|t| t.to_string()).collect();

    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "completely distinct words here".to_string(),
            tags: tags.clone(),
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "another unrelated sentence entirely".to_string(),
            tags,
            auto_link: true,
            ..Default::default()
        },
    );

    let edge = storage
        .with_connection(|conn| get_link(conn, &m2.id, &m1.id))
        .unwrap()
        .expect("inference should have linked the twins");
    assert_eq!(edge.relation, Relation::Related);
    assert_eq!(edge.weight, 1.0);
    assert!(edge.auto_generated);
}

#[test]
fn test_auto_link_requires_two_shared_tags() {
    let storage = open();
    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "first distinct body".to_string(),
            category: Some("alpha".to_string()),
            tags: vec!["only".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "second separate text".to_string(),
            category: Some("beta".to_string()),
            tags: vec!["only".to_string()],
            auto_link: true,
            ..Default::default()
        },
    );

    // One shared tag is below the inference threshold, and the categories
    // differ so the temporal signal stays quiet too
    assert!(storage
        .with_connection(|conn| get_link(conn, &m2.id, &m1.id))
        .unwrap()
        .is_none());
}

#[test]
fn test_auto_link_on_temporal_proximity() {
    let storage = open();
    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "alpha words".to_string(),
            category: Some("sessions".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "beta phrases".to_string(),
            category: Some("sessions".to_string()),
            auto_link: true,
            ..Default::default()
        },
    );

    let edge = storage
        .with_connection(|conn| get_link(conn, &m2.id, &m1.id))
        .unwrap()
        .expect("same category created at the same time should link");
    assert_eq!(edge.relation, Relation::Related);
    assert_eq!(edge.weight, 0.4);
    assert!(edge.auto_generated);
}

#[test]
fn test_auto_link_opt_out() {
    let storage = open();
    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "one".to_string(),
            category: Some("sessions".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "two".to_string(),
            category: Some("sessions".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );

    let page = storage
        .with_connection(|conn| list_links(conn, &LinkQuery::default()))
        .unwrap();
    assert_eq!(page.total, 0);
    drop((m1, m2));
}

#[test]
fn test_auto_link_stays_in_project() {
    let storage = open();
    save(
        &storage,
        CreateMemoryInput {
            content: "same category other project".to_string(),
            category: Some("sessions".to_string()),
            project: Some("work".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "same category default project".to_string(),
            category: Some("sessions".to_string()),
            auto_link: true,
            ..Default::default()
        },
    );

    let page = storage
        .with_connection(|conn| {
            list_links(
                conn,
                &LinkQuery {
                    from: Some(m2.id.clone()),
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(page.total, 0);
}

// ============================================================================
// SUGGESTIONS
// ============================================================================

#[test]
fn test_suggestions_use_gentler_tag_threshold() {
    let storage = open();
    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "first distinct phrasing".to_string(),
            category: Some("alpha".to_string()),
            tags: vec!["shared".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "second different wording".to_string(),
            category: Some("beta".to_string()),
            tags: vec!["shared".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );

    let suggestions = storage
        .with_connection(|conn| {
            suggest_links(
                conn,
                &SuggestOptions {
                    id: Some(m2.id.clone()),
                    project: None,
                    limit: None,
                },
            )
        })
        .unwrap();

    let shared: Vec<_> = suggestions
        .iter()
        .filter(|s| s.reason == SuggestReason::SharedTags)
        .collect();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].from_id, m2.id);
    assert_eq!(shared[0].to_id, m1.id);
    assert_eq!(shared[0].suggested_relation, Relation::Related);
    assert!((shared[0].weight - 0.3).abs() < 1e-9);
    assert_eq!(shared[0].tags, vec!["shared"]);
}

#[test]
fn test_suggestions_exclude_already_linked_peers() {
    let storage = open();
    let m1 = save(
        &storage,
        CreateMemoryInput {
            content: "first distinct phrasing".to_string(),
            tags: vec!["shared".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );
    let m2 = save(
        &storage,
        CreateMemoryInput {
            content: "second different wording".to_string(),
            tags: vec!["shared".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );
    link(&storage, &m1, &m2, Relation::Related);

    let suggestions = storage
        .with_connection(|conn| {
            suggest_links(
                conn,
                &SuggestOptions {
                    id: Some(m2.id.clone()),
                    project: None,
                    limit: None,
                },
            )
        })
        .unwrap();
    assert!(!suggestions.iter().any(|s| s.to_id == m1.id));
}

#[test]
fn test_suggestions_analyze_orphans_when_no_id_given() {
    let storage = open();
    // Two orphans sharing a tag; analysis starts from orphans
    save(
        &storage,
        CreateMemoryInput {
            content: "orphan one text".to_string(),
            tags: vec!["lonely".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );
    save(
        &storage,
        CreateMemoryInput {
            content: "orphan two words".to_string(),
            tags: vec!["lonely".to_string()],
            auto_link: false,
            ..Default::default()
        },
    );

    let suggestions = storage
        .with_connection(|conn| suggest_links(conn, &SuggestOptions::default()))
        .unwrap();
    assert!(!suggestions.is_empty());

    // Deduplicated per (from, to) pair
    let mut pairs: Vec<(String, String)> = suggestions
        .iter()
        .map(|s| (s.from_id.clone(), s.to_id.clone()))
        .collect();
    pairs.sort();
    let mut unique = pairs.clone();
    unique.dedup();
    assert_eq!(pairs, unique);
}

#[test]
fn test_suggestions_respect_limit() {
    let storage = open();
    for i in 0..6 {
        save(
            &storage,
            CreateMemoryInput {
                content: format!("note number {}", i),
                tags: vec!["common".to_string()],
                auto_link: false,
                ..Default::default()
            },
        );
    }

    let suggestions = storage
        .with_connection(|conn| {
            suggest_links(
                conn,
                &SuggestOptions {
                    id: None,
                    project: None,
                    limit: Some(3),
                },
            )
        })
        .unwrap();
    assert!(suggestions.len() <= 3);
}

// ============================================================================
// GRAPH EXPORT
// ============================================================================

#[test]
fn test_get_graph_nodes_edges_and_diagram() {
    let storage = open();
    let a = save(&storage, quiet("first memory\nwith a second line"));
    let b = save(&storage, quiet("second memory"));
    let orphan = save(&storage, quiet("orphan memory"));
    link(&storage, &a, &b, Relation::Caused);

    let graph = storage
        .with_connection(|conn| get_graph(conn, &GraphOptions::default()))
        .unwrap();
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.nodes.len(), 2);
    // Newlines are collapsed in previews
    assert!(!graph.nodes.iter().any(|n| n.preview.contains('\n')));
    assert!(graph.diagram.starts_with("flowchart LR\n"));
    assert!(graph.diagram.contains("-- caused -->"));

    let with_orphans = storage
        .with_connection(|conn| {
            get_graph(
                conn,
                &GraphOptions {
                    include_orphans: true,
                    ..Default::default()
                },
            )
        })
        .unwrap();
    assert_eq!(with_orphans.nodes.len(), 3);
    assert!(with_orphans.nodes.iter().any(|n| n.id == orphan.id));
}

#[test]
fn test_get_graph_scopes_edges_to_project() {
    let storage = open();
    let a = save(&storage, quiet("a"));
    let elsewhere = save(
        &storage,
        CreateMemoryInput {
            content: "other project".to_string(),
            project: Some("work".to_string()),
            auto_link: false,
            ..Default::default()
        },
    );
    link(&storage, &a, &elsewhere, Relation::Related);

    // The edge crosses projects, so neither side's graph contains it
    let graph = storage
        .with_connection(|conn| get_graph(conn, &GraphOptions::default()))
        .unwrap();
    assert!(graph.edges.is_empty());
}

#[test]
fn test_empty_graph_has_placeholder_diagram() {
    let storage = open();
    let graph = storage
        .with_connection(|conn| get_graph(conn, &GraphOptions::default()))
        .unwrap();
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());
    assert!(graph.diagram.contains("no memories"));
}
