//! Engram CLI
//!
//! Thin command-line wrapper over the memory engine. Prints JSON for
//! structured results and compact lines for listings; exits 0 on success
//! and 1 on invalid arguments or operation failure.

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

use engram::config::{expand_path, Config};
use engram::error::Result;
use engram::graph::autolink::{suggest_links, SuggestOptions};
use engram::graph::export::{get_graph, GraphOptions};
use engram::graph::{
    get_related, get_related_deep, link_memories, unlink_memories, RelatedQuery, TraversalOptions,
};
use engram::search::{search_with_total, SearchOptions};
use engram::storage::filters::{list_with_total, ListOptions, MemoryFilters};
use engram::storage::history::{get_history, restore_memory, HistoryQuery};
use engram::storage::projects::{list_projects, migrate_to_project, rename_tag};
use engram::storage::queries::{
    create_memory, delete_memory, export_memories, get_memory, import_memories, purge_expired,
};
use engram::storage::stats::{get_context_snapshot, get_stats, SnapshotOptions};
use engram::storage::{CheckpointMode, Storage};
use engram::types::*;

#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "Knowledge-graph memory store for AI agents")]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(long, env = "ENGRAM_DB_PATH", default_value = "~/.engram/memories.db")]
    db_path: String,

    /// Default project namespace
    #[arg(long, env = "ENGRAM_PROJECT", default_value = "default")]
    project: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a new memory
    Save {
        /// Content to remember
        content: String,
        /// Category
        #[arg(short, long)]
        category: Option<String>,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Expiry timestamp
        #[arg(long)]
        expires_at: Option<String>,
        /// Skip link inference
        #[arg(long)]
        no_auto_link: bool,
        /// Skip saving when identical content already exists in the project
        #[arg(long)]
        dedup: bool,
    },
    /// Get a memory by id
    Get {
        id: String,
    },
    /// List memories
    List {
        #[arg(short, long, default_value = "20")]
        limit: i64,
        #[arg(short, long)]
        category: Option<String>,
        #[arg(short = 'T', long)]
        tag: Option<String>,
        /// Show every project, not just the active one
        #[arg(long)]
        all_projects: bool,
    },
    /// Search memories
    Search {
        query: String,
        #[arg(short, long, default_value = "any")]
        mode: String,
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Delete a memory
    Delete {
        id: String,
    },
    /// Link two memories
    Link {
        from: String,
        to: String,
        #[arg(short, long, default_value = "related")]
        relation: String,
        #[arg(short, long)]
        weight: Option<f64>,
    },
    /// Remove a link
    Unlink {
        from: String,
        to: String,
    },
    /// Show direct neighbors of a memory
    Related {
        id: String,
        #[arg(short, long, default_value = "both")]
        direction: String,
        /// Traverse multiple hops instead of one
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Export the project graph as a Mermaid diagram
    Graph {
        #[arg(long)]
        include_orphans: bool,
    },
    /// Suggest links for a memory or for project orphans
    Suggest {
        id: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show a memory's history
    History {
        id: String,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Restore a memory to a history snapshot
    Restore {
        memory_id: String,
        history_id: i64,
    },
    /// Show store statistics
    Stats,
    /// Compact per-category project snapshot
    Snapshot,
    /// List project namespaces
    Projects,
    /// Move every memory carrying a tag into the active project
    MigrateToProject {
        tag: String,
    },
    /// Rename a tag within the active project
    RenameTag {
        old_tag: String,
        new_tag: String,
        /// Rename across every project
        #[arg(long)]
        all_projects: bool,
    },
    /// Physically delete expired memories
    Purge,
    /// Integrity check and WAL checkpoint
    Maintenance {
        #[arg(short, long, default_value = "PASSIVE")]
        mode: String,
    },
    /// Write a timestamped backup beside the database
    Backup,
    /// Dump all memories as JSON to stdout
    Export,
    /// Import memories from a JSON file
    Import {
        /// File with an exported payload or an array of memories
        file: String,
        #[arg(short, long, default_value = "insert")]
        mode: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Invalid arguments exit 1, like operation failures
    let cli = Cli::command()
        .try_get_matches()
        .and_then(|matches| Cli::from_arg_matches(&matches))
        .unwrap_or_else(|err| {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        });

    let config = Config {
        db_path: expand_path(&cli.db_path),
        default_project: cli.project.clone(),
    };
    let storage = Storage::open(config)?;
    let project = cli.project.clone();

    match cli.command {
        Commands::Save {
            content,
            category,
            tags,
            expires_at,
            no_auto_link,
            dedup,
        } => {
            let tags: Vec<String> = tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();

            let input = CreateMemoryInput {
                content,
                category,
                tags,
                metadata: Default::default(),
                project: Some(project),
                expires_at,
                auto_link: !no_auto_link,
                dedup,
            };

            let created = storage.with_transaction(|conn| create_memory(conn, &input))?;
            if created.deduplicated {
                println!("Duplicate content, returning existing memory {}", created.memory.id);
            } else {
                println!("Saved memory {}", created.memory.id);
            }
            println!("{}", serde_json::to_string_pretty(&created)?);
        }

        Commands::Get { id } => {
            match storage.with_connection(|conn| get_memory(conn, &id))? {
                Some(memory) => println!("{}", serde_json::to_string_pretty(&memory)?),
                None => println!("null"),
            }
        }

        Commands::List {
            limit,
            category,
            tag,
            all_projects,
        } => {
            let options = ListOptions {
                filters: MemoryFilters {
                    category,
                    tag,
                    project: (!all_projects).then_some(project),
                    ..Default::default()
                },
                limit: Some(limit),
                ..Default::default()
            };

            let page = storage.with_connection(|conn| list_with_total(conn, &options))?;
            for memory in &page.memories {
                println!(
                    "{} [{}] {} - {}",
                    memory.id,
                    memory.category,
                    memory.tags.join(", "),
                    truncate(&memory.content, 60)
                );
            }
            println!("({} of {})", page.memories.len(), page.total);
        }

        Commands::Search { query, mode, limit } => {
            let options = SearchOptions {
                query,
                mode: mode
                    .parse()
                    .map_err(engram::EngramError::InvalidInput)?,
                filters: MemoryFilters {
                    project: Some(project),
                    ..Default::default()
                },
                limit: Some(limit),
                ..Default::default()
            };

            let page = storage.with_connection(|conn| search_with_total(conn, &options))?;
            for memory in &page.memories {
                println!("{} [{}] {}", memory.id, memory.category, truncate(&memory.content, 60));
            }
            println!("({} of {})", page.memories.len(), page.total);
        }

        Commands::Delete { id } => {
            storage.with_transaction(|conn| delete_memory(conn, &id))?;
            println!("Deleted memory {}", id);
        }

        Commands::Link {
            from,
            to,
            relation,
            weight,
        } => {
            let relation: Relation = relation
                .parse()
                .map_err(engram::EngramError::InvalidInput)?;
            let link = storage.with_transaction(|conn| {
                link_memories(conn, &from, &to, relation, weight, false)
            })?;
            println!("Linked {} -- {} --> {}", link.from_id, link.relation, link.to_id);
        }

        Commands::Unlink { from, to } => {
            let removed = storage.with_transaction(|conn| unlink_memories(conn, &from, &to))?;
            println!("{}", if removed { "Unlinked" } else { "No such link" });
        }

        Commands::Related {
            id,
            direction,
            depth,
        } => match depth {
            Some(depth) => {
                let options = TraversalOptions {
                    id,
                    max_depth: Some(depth),
                    relation: None,
                    limit: None,
                };
                let related = storage.with_connection(|conn| get_related_deep(conn, &options))?;
                for item in related {
                    println!(
                        "depth {} | {} [{}] {}",
                        item.depth,
                        item.memory.id,
                        item.memory.category,
                        truncate(&item.memory.content, 50)
                    );
                }
            }
            None => {
                let query = RelatedQuery {
                    id,
                    relation: None,
                    direction: direction
                        .parse()
                        .map_err(engram::EngramError::InvalidInput)?,
                };
                let related = storage.with_connection(|conn| get_related(conn, &query))?;
                for item in related {
                    println!(
                        "{:?} {} ({}) {}",
                        item.direction,
                        item.memory.id,
                        item.relation,
                        truncate(&item.memory.content, 50)
                    );
                }
            }
        },

        Commands::Graph { include_orphans } => {
            let options = GraphOptions {
                include_orphans,
                relation: None,
                project: Some(project),
            };
            let graph = storage.with_connection(|conn| get_graph(conn, &options))?;
            println!("{}", graph.diagram);
        }

        Commands::Suggest { id, limit } => {
            let options = SuggestOptions {
                id,
                project: Some(project),
                limit: Some(limit),
            };
            let suggestions = storage.with_connection(|conn| suggest_links(conn, &options))?;
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
        }

        Commands::History { id, limit } => {
            let query = HistoryQuery {
                memory_id: id,
                limit: Some(limit),
                offset: None,
            };
            let page = storage.with_connection(|conn| get_history(conn, &query))?;
            for entry in &page.entries {
                println!(
                    "#{} {} {} - {}",
                    entry.history_id,
                    entry.changed_at,
                    entry.operation.as_str(),
                    truncate(&entry.content, 50)
                );
            }
            println!("({} of {})", page.entries.len(), page.total);
        }

        Commands::Restore {
            memory_id,
            history_id,
        } => {
            match storage.with_transaction(|conn| restore_memory(conn, &memory_id, history_id))? {
                Some(memory) => {
                    println!("Restored memory {}", memory.id);
                    println!("{}", serde_json::to_string_pretty(&memory)?);
                }
                None => println!("Nothing to restore"),
            }
        }

        Commands::Stats => {
            let stats = storage.with_connection(|conn| get_stats(conn, Some(&project)))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Snapshot => {
            let options = SnapshotOptions {
                project: Some(project),
                ..Default::default()
            };
            let snapshot = storage.with_connection(|conn| get_context_snapshot(conn, &options))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Commands::Projects => {
            let projects = storage.with_connection(list_projects)?;
            for info in projects {
                println!("{} ({})", info.project, info.count);
            }
        }

        Commands::MigrateToProject { tag } => {
            let migrated =
                storage.with_transaction(|conn| migrate_to_project(conn, &tag, &project))?;
            println!("Migrated {} memories to {}", migrated, project);
        }

        Commands::RenameTag {
            old_tag,
            new_tag,
            all_projects,
        } => {
            let scope = (!all_projects).then_some(project);
            let result = storage.with_transaction(|conn| {
                rename_tag(conn, &old_tag, &new_tag, scope.as_deref())
            })?;
            println!(
                "Renamed '{}' to '{}' in {} memories",
                result.old_tag, result.new_tag, result.updated
            );
        }

        Commands::Purge => {
            let result = storage.with_transaction(purge_expired)?;
            println!("Purged {} expired memories", result.purged);
            for id in result.ids {
                println!("  {}", id);
            }
        }

        Commands::Maintenance { mode } => {
            let mode: CheckpointMode = mode
                .parse()
                .map_err(engram::EngramError::InvalidInput)?;
            let report = storage.maintenance(mode)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Backup => {
            let path = storage.backup()?;
            println!("Backup written to {}", path.display());
        }

        Commands::Export => {
            let export = storage.with_connection(export_memories)?;
            println!("{}", serde_json::to_string_pretty(&export)?);
        }

        Commands::Import { file, mode } => {
            let mode: ImportMode = mode
                .parse()
                .map_err(engram::EngramError::InvalidInput)?;
            let payload = std::fs::read_to_string(&file)?;

            // Accept a full export payload or a bare array of rows
            let entries: Vec<ImportEntry> =
                match serde_json::from_str::<ExportData>(&payload) {
                    Ok(export) => export
                        .memories
                        .into_iter()
                        .map(import_entry_from_memory)
                        .collect(),
                    Err(_) => serde_json::from_str(&payload)?,
                };

            let result =
                storage.with_transaction(|conn| import_memories(conn, &entries, mode))?;
            println!(
                "Imported {} memories ({} skipped)",
                result.imported, result.skipped
            );
        }
    }

    storage.close()?;

    Ok(())
}

fn import_entry_from_memory(memory: Memory) -> ImportEntry {
    ImportEntry {
        id: Some(memory.id),
        content: memory.content,
        category: Some(memory.category),
        tags: memory.tags,
        metadata: memory.metadata,
        project: Some(memory.project),
        expires_at: memory.expires_at,
    }
}

fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or(s);
    if first_line.chars().count() <= max {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
