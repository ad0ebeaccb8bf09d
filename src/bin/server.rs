//! Engram MCP server
//!
//! Serves the engine's operations as MCP tools over line-framed stdio.
//! Argument parsing and enum validation happen here, at the tool boundary;
//! the engine below only sees typed inputs. Human-readable error messages
//! are produced in Spanish from the engine's typed error kinds.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use engram::config::Config;
use engram::error::{EngramError, Result};
use engram::graph::autolink::{suggest_links, SuggestOptions};
use engram::graph::export::{get_graph, GraphOptions};
use engram::graph::{
    get_related, get_related_deep, link_memories, list_links, unlink_memories, update_link,
    LinkQuery, RelatedQuery, TraversalOptions,
};
use engram::mcp::protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer, ToolCallResult,
};
use engram::mcp::tools::tool_definitions;
use engram::search::{search_with_total, SearchOptions};
use engram::storage::filters::{list_with_total, ListOptions, MemoryFilters, MetadataFilter};
use engram::storage::history::{get_history, restore_memory, HistoryQuery};
use engram::storage::projects::{list_projects, migrate_to_project, rename_tag};
use engram::storage::queries::{
    create_memory, create_memory_batch, delete_memory, delete_memory_batch, export_memories,
    get_memories, get_memory, import_memories, purge_expired, update_memory, update_memory_batch,
};
use engram::storage::stats::{get_context_snapshot, get_stats, SnapshotOptions};
use engram::storage::{CheckpointMode, Storage};
use engram::types::*;

struct EngramServer {
    storage: Storage,
    config: Config,
}

impl McpHandler for EngramServer {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => McpResponse::success(
                request.id,
                serde_json::to_value(InitializeResult::default()).unwrap_or_default(),
            ),
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => McpResponse::success(
                request.id,
                json!({ "tools": tool_definitions() }),
            ),
            methods::CALL_TOOL => {
                let result = self.handle_tool_call(&request.params);
                McpResponse::success(
                    request.id,
                    serde_json::to_value(result).unwrap_or_default(),
                )
            }
            other => McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", other),
            ),
        }
    }
}

impl EngramServer {
    fn handle_tool_call(&self, params: &Value) -> ToolCallResult {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        tracing::debug!(tool = name, "tool call");

        match self.dispatch(name, args) {
            Ok(value) => ToolCallResult::json(&value),
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool call failed");
                ToolCallResult::error(user_message(&err))
            }
        }
    }

    fn dispatch(&self, name: &str, args: Value) -> Result<Value> {
        match name {
            "save_memory" => {
                let mut input: CreateMemoryInput = parse_args(args)?;
                self.apply_default_project(&mut input.project);
                let created = self.storage.with_transaction(|conn| create_memory(conn, &input))?;
                to_value(created)
            }
            "save_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    memories: Vec<CreateMemoryInput>,
                }
                let mut args: Args = parse_args(args)?;
                for input in &mut args.memories {
                    self.apply_default_project(&mut input.project);
                }
                let created = self
                    .storage
                    .with_transaction(|conn| create_memory_batch(conn, &args.memories))?;
                to_value(created)
            }
            "get_memory" => {
                #[derive(Deserialize)]
                struct Args {
                    id: String,
                }
                let args: Args = parse_args(args)?;
                let memory = self.storage.with_connection(|conn| get_memory(conn, &args.id))?;
                to_value(memory)
            }
            "get_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    ids: Vec<String>,
                }
                let args: Args = parse_args(args)?;
                let memories = self
                    .storage
                    .with_connection(|conn| get_memories(conn, &args.ids))?;
                to_value(memories)
            }
            "update_memory" => {
                #[derive(Deserialize)]
                struct Args {
                    id: String,
                    #[serde(flatten)]
                    input: UpdateMemoryInput,
                }
                let args: Args = parse_args(args)?;
                let memory = self
                    .storage
                    .with_transaction(|conn| update_memory(conn, &args.id, &args.input))?;
                to_value(memory)
            }
            "update_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    updates: Vec<UpdateBatchEntry>,
                }
                let args: Args = parse_args(args)?;
                let result = self
                    .storage
                    .with_transaction(|conn| update_memory_batch(conn, &args.updates))?;
                to_value(result)
            }
            "delete_memory" => {
                #[derive(Deserialize)]
                struct Args {
                    id: String,
                }
                let args: Args = parse_args(args)?;
                self.storage
                    .with_transaction(|conn| delete_memory(conn, &args.id))?;
                Ok(json!({ "deleted": args.id }))
            }
            "delete_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    ids: Vec<String>,
                }
                let args: Args = parse_args(args)?;
                let result = self
                    .storage
                    .with_transaction(|conn| delete_memory_batch(conn, &args.ids))?;
                to_value(result)
            }
            "list_memories" => {
                let args: FilterArgs = parse_args(args)?;
                let options = ListOptions {
                    filters: args.clone().into_filters()?,
                    sort: parse_sort(args.sort.as_deref())?.unwrap_or_default(),
                    limit: args.limit,
                    offset: args.offset,
                };
                let page = self
                    .storage
                    .with_connection(|conn| list_with_total(conn, &options))?;
                to_value(page)
            }
            "search_memories" => {
                let args: SearchArgs = parse_args(args)?;
                let options = SearchOptions {
                    query: args.query.clone(),
                    mode: parse_enum(args.mode.as_deref(), "modo de búsqueda")?.unwrap_or_default(),
                    near_distance: args.near_distance,
                    filters: args.filters.clone().into_filters()?,
                    sort: parse_sort(args.filters.sort.as_deref())?,
                    limit: args.filters.limit,
                    offset: args.filters.offset,
                };
                let page = self
                    .storage
                    .with_connection(|conn| search_with_total(conn, &options))?;
                to_value(page)
            }
            "get_context_snapshot" => {
                let mut options: SnapshotOptions = parse_args(args)?;
                self.apply_default_project(&mut options.project);
                let snapshot = self
                    .storage
                    .with_connection(|conn| get_context_snapshot(conn, &options))?;
                to_value(snapshot)
            }
            "get_stats" => {
                #[derive(Deserialize)]
                struct Args {
                    project: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let stats = self
                    .storage
                    .with_connection(|conn| get_stats(conn, args.project.as_deref()))?;
                to_value(stats)
            }
            "list_projects" => {
                let projects = self.storage.with_connection(list_projects)?;
                to_value(projects)
            }
            "migrate_to_project" => {
                #[derive(Deserialize)]
                struct Args {
                    tag: String,
                    project: String,
                }
                let args: Args = parse_args(args)?;
                let migrated = self
                    .storage
                    .with_transaction(|conn| migrate_to_project(conn, &args.tag, &args.project))?;
                Ok(json!({ "migrated": migrated, "project": args.project }))
            }
            "link_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    from_id: String,
                    to_id: String,
                    relation: Option<String>,
                    weight: Option<f64>,
                }
                let args: Args = parse_args(args)?;
                let relation = parse_enum(args.relation.as_deref(), "relación")?.unwrap_or_default();
                let link = self.storage.with_transaction(|conn| {
                    link_memories(conn, &args.from_id, &args.to_id, relation, args.weight, false)
                })?;
                to_value(link)
            }
            "unlink_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    from_id: String,
                    to_id: String,
                }
                let args: Args = parse_args(args)?;
                let removed = self.storage.with_transaction(|conn| {
                    unlink_memories(conn, &args.from_id, &args.to_id)
                })?;
                Ok(json!({ "removed": removed }))
            }
            "update_link" => {
                #[derive(Deserialize)]
                struct Args {
                    from_id: String,
                    to_id: String,
                    relation: String,
                }
                let args: Args = parse_args(args)?;
                let relation: Relation =
                    parse_enum(Some(args.relation.as_str()), "relación")?.unwrap_or_default();
                let link = self.storage.with_transaction(|conn| {
                    update_link(conn, &args.from_id, &args.to_id, relation)
                })?;
                to_value(link)
            }
            "get_related" => {
                #[derive(Deserialize)]
                struct Args {
                    id: String,
                    relation: Option<String>,
                    direction: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let query = RelatedQuery {
                    id: args.id,
                    relation: parse_enum(args.relation.as_deref(), "relación")?,
                    direction: parse_enum(args.direction.as_deref(), "dirección")?
                        .unwrap_or_default(),
                };
                let related = self
                    .storage
                    .with_connection(|conn| get_related(conn, &query))?;
                to_value(related)
            }
            "get_related_deep" => {
                #[derive(Deserialize)]
                struct Args {
                    id: String,
                    max_depth: Option<u32>,
                    relation: Option<String>,
                    limit: Option<i64>,
                }
                let args: Args = parse_args(args)?;
                let options = TraversalOptions {
                    id: args.id,
                    max_depth: args.max_depth,
                    relation: parse_enum(args.relation.as_deref(), "relación")?,
                    limit: args.limit,
                };
                let related = self
                    .storage
                    .with_connection(|conn| get_related_deep(conn, &options))?;
                to_value(related)
            }
            "get_links" => {
                #[derive(Deserialize)]
                struct Args {
                    from: Option<String>,
                    to: Option<String>,
                    relation: Option<String>,
                    limit: Option<i64>,
                    offset: Option<i64>,
                }
                let args: Args = parse_args(args)?;
                let query = LinkQuery {
                    from: args.from,
                    to: args.to,
                    relation: parse_enum(args.relation.as_deref(), "relación")?,
                    limit: args.limit,
                    offset: args.offset,
                };
                let page = self.storage.with_connection(|conn| list_links(conn, &query))?;
                to_value(page)
            }
            "get_graph" => {
                #[derive(Deserialize)]
                struct Args {
                    #[serde(default)]
                    include_orphans: bool,
                    relation: Option<String>,
                    project: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let mut options = GraphOptions {
                    include_orphans: args.include_orphans,
                    relation: parse_enum(args.relation.as_deref(), "relación")?,
                    project: args.project,
                };
                self.apply_default_project(&mut options.project);
                let graph = self.storage.with_connection(|conn| get_graph(conn, &options))?;
                to_value(graph)
            }
            "suggest_links" => {
                let mut options: SuggestOptions = parse_args(args)?;
                self.apply_default_project(&mut options.project);
                let suggestions = self
                    .storage
                    .with_connection(|conn| suggest_links(conn, &options))?;
                to_value(suggestions)
            }
            "get_history" => {
                let query: HistoryQuery = parse_args(args)?;
                let page = self.storage.with_connection(|conn| get_history(conn, &query))?;
                to_value(page)
            }
            "restore_memory" => {
                #[derive(Deserialize)]
                struct Args {
                    memory_id: String,
                    history_id: i64,
                }
                let args: Args = parse_args(args)?;
                let restored = self.storage.with_transaction(|conn| {
                    restore_memory(conn, &args.memory_id, args.history_id)
                })?;
                to_value(restored)
            }
            "export_memories" => {
                let export = self.storage.with_connection(export_memories)?;
                to_value(export)
            }
            "import_memories" => {
                #[derive(Deserialize)]
                struct Args {
                    memories: Vec<ImportEntry>,
                    mode: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let mode = parse_enum(args.mode.as_deref(), "modo de importación")?
                    .unwrap_or_default();
                let result = self
                    .storage
                    .with_transaction(|conn| import_memories(conn, &args.memories, mode))?;
                to_value(result)
            }
            "rename_tag" => {
                #[derive(Deserialize)]
                struct Args {
                    old_tag: String,
                    new_tag: String,
                    project: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let result = self.storage.with_transaction(|conn| {
                    rename_tag(conn, &args.old_tag, &args.new_tag, args.project.as_deref())
                })?;
                to_value(result)
            }
            "purge_expired" => {
                let result = self.storage.with_transaction(purge_expired)?;
                to_value(result)
            }
            "db_maintenance" => {
                #[derive(Deserialize)]
                struct Args {
                    mode: Option<String>,
                }
                let args: Args = parse_args(args)?;
                let mode: CheckpointMode =
                    parse_enum(args.mode.as_deref(), "modo de mantenimiento")?.unwrap_or_default();
                let report = self.storage.maintenance(mode)?;
                to_value(report)
            }
            "backup" => {
                let path = self.storage.backup()?;
                Ok(json!({ "path": path.to_string_lossy() }))
            }
            other => Err(EngramError::InvalidInput(format!(
                "unknown tool: {}",
                other
            ))),
        }
    }

    fn apply_default_project(&self, project: &mut Option<String>) {
        if project.is_none() {
            *project = Some(self.config.default_project.clone());
        }
    }
}

/// Shared filter/pagination arguments of list and search tools
#[derive(Debug, Clone, Deserialize)]
struct FilterArgs {
    category: Option<String>,
    tag: Option<String>,
    project: Option<String>,
    metadata_key: Option<String>,
    metadata_value: Option<Value>,
    created_after: Option<String>,
    created_before: Option<String>,
    updated_after: Option<String>,
    updated_before: Option<String>,
    sort: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl FilterArgs {
    fn into_filters(self) -> Result<MemoryFilters> {
        let metadata = match (self.metadata_key, self.metadata_value) {
            (Some(key), Some(value)) => Some(MetadataFilter { key, value }),
            (Some(_), None) => {
                return Err(EngramError::InvalidInput(
                    "metadata_key requires metadata_value".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(EngramError::InvalidInput(
                    "metadata_value requires metadata_key".to_string(),
                ));
            }
            (None, None) => None,
        };

        Ok(MemoryFilters {
            category: self.category,
            tag: self.tag,
            project: self.project,
            metadata,
            created_after: self.created_after,
            created_before: self.created_before,
            updated_after: self.updated_after,
            updated_before: self.updated_before,
            include_expired: false,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SearchArgs {
    query: String,
    mode: Option<String>,
    near_distance: Option<u32>,
    #[serde(flatten)]
    filters: FilterArgs,
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| EngramError::InvalidInput(format!("bad arguments: {}", e)))
}

fn parse_enum<T>(value: Option<&str>, what: &str) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match value {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| EngramError::InvalidInput(format!("{}: {}", what, s))),
    }
}

fn parse_sort(value: Option<&str>) -> Result<Option<ListSort>> {
    parse_enum(value, "orden")
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Human-readable message surfaced to tool callers
fn user_message(err: &EngramError) -> String {
    match err {
        EngramError::NotFound(id) => format!("Memoria no encontrada: {}", id),
        EngramError::InvalidInput(msg) => format!("Entrada inválida: {}", msg),
        EngramError::Integrity(msg) => format!("Error de integridad: {}", msg),
        EngramError::Storage(msg) => format!("Error de almacenamiento: {}", msg),
        other => format!("Error interno: {}", other),
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    tracing::info!(db_path = %config.db_path, project = %config.default_project, "starting engram server");

    let storage = Storage::open(config.clone())?;
    let server = McpServer::new(EngramServer {
        storage: storage.clone(),
        config,
    });
    server.run()?;
    storage.close()?;

    Ok(())
}
