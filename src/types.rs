//! Core types for Engram

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a memory (UUID v4, textual form)
pub type MemoryId = String;

/// A memory entry in the database
///
/// Timestamps carry the store's `datetime('now')` format
/// (`YYYY-MM-DD HH:MM:SS`, UTC, second precision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier
    pub id: MemoryId,
    /// Main content of the memory (trimmed, never empty)
    pub content: String,
    /// Lowercase category token (e.g. "code", "decision")
    #[serde(default = "default_category")]
    pub category: String,
    /// Tags for categorization, distinct, insertion order preserved
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary metadata as a JSON object
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Project namespace
    #[serde(default = "default_project")]
    pub project: String,
    /// When the memory was created
    pub created_at: String,
    /// When the memory was last updated
    pub updated_at: String,
    /// When the memory expires (None = never)
    #[serde(default)]
    pub expires_at: Option<String>,
}

pub(crate) fn default_category() -> String {
    "general".to_string()
}

pub(crate) fn default_project() -> String {
    "default".to_string()
}

/// Maximum content length in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Result of a create: the stored row, flagged when dedup short-circuited
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedMemory {
    #[serde(flatten)]
    pub memory: Memory,
    /// True when an existing live memory with the same content fingerprint
    /// was returned instead of inserting a new row
    #[serde(rename = "_deduplicated", default, skip_serializing_if = "is_false")]
    pub deduplicated: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Typed relation carried by a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Caused,
    References,
    Supersedes,
    #[default]
    Related,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Caused => "caused",
            Relation::References => "references",
            Relation::Supersedes => "supersedes",
            Relation::Related => "related",
        }
    }

    pub fn all() -> &'static [Relation] {
        &[
            Relation::Caused,
            Relation::References,
            Relation::Supersedes,
            Relation::Related,
        ]
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "caused" => Ok(Relation::Caused),
            "references" => Ok(Relation::References),
            "supersedes" => Ok(Relation::Supersedes),
            "related" => Ok(Relation::Related),
            _ => Err(format!("Unknown relation: {}", s)),
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge between two memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub from_id: MemoryId,
    pub to_id: MemoryId,
    pub relation: Relation,
    /// Edge weight in [0.0, 1.0]
    pub weight: f64,
    /// True when the edge was created by the inference engine
    pub auto_generated: bool,
    pub created_at: String,
}

/// Side of a node a related-memory query looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outgoing edges of the queried node
    From,
    /// Incoming edges of the queried node
    To,
    /// Both sides, outgoing first
    #[default]
    Both,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "from" => Ok(Direction::From),
            "to" => Ok(Direction::To),
            "both" => Ok(Direction::Both),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

/// A peer memory reached over one edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedMemory {
    pub memory: Memory,
    pub relation: Relation,
    pub direction: Direction,
    pub weight: f64,
    pub auto_generated: bool,
    pub created_at: String,
}

/// Mutation kind recorded in the history trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// One audit-trail entry: the post-image of a mutation (pre-image for delete)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub memory_id: MemoryId,
    pub operation: Operation,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub project: String,
    pub expires_at: Option<String>,
    pub changed_at: String,
}

/// Input for creating a new memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMemoryInput {
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub project: Option<String>,
    /// Absolute expiry timestamp (None = never expires)
    pub expires_at: Option<String>,
    /// Run link inference after the insert (default: true)
    #[serde(default = "default_true")]
    pub auto_link: bool,
    /// Return an existing live memory with the same content fingerprint
    /// in the same project instead of inserting (default: false)
    #[serde(default)]
    pub dedup: bool,
}

pub(crate) fn default_true() -> bool {
    true
}

impl Default for CreateMemoryInput {
    fn default() -> Self {
        Self {
            content: String::new(),
            category: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
            project: None,
            expires_at: None,
            auto_link: true,
            dedup: false,
        }
    }
}

/// Input for updating a memory
///
/// Omitted fields keep their current values; `tags` and `metadata` replace
/// wholesale when provided. `expires_at` is tri-state: omitted keeps,
/// `Some(None)` clears, `Some(Some(ts))` sets.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMemoryInput {
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub project: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_double_option"
    )]
    pub expires_at: Option<Option<String>>,
}

impl UpdateMemoryInput {
    /// True when no updatable field is present
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
            && self.project.is_none()
            && self.expires_at.is_none()
    }
}

/// Distinguishes an absent `expires_at` key from an explicit null
mod serde_double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Ok(Some(Option::<String>::deserialize(deserializer)?))
    }
}

/// One entry of an update batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBatchEntry {
    pub id: MemoryId,
    #[serde(flatten)]
    pub input: UpdateMemoryInput,
}

/// Sort orders for listing and filtered search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
    UpdatedAtDesc,
}

impl ListSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListSort::CreatedAtDesc => "created_at_desc",
            ListSort::CreatedAtAsc => "created_at_asc",
            ListSort::UpdatedAtDesc => "updated_at_desc",
        }
    }

    /// ORDER BY clause, with tie-breaks pinned for the created_at orders
    pub(crate) fn order_clause(&self) -> &'static str {
        match self {
            ListSort::CreatedAtDesc => "ORDER BY m.created_at DESC, m.rowid DESC",
            ListSort::CreatedAtAsc => "ORDER BY m.created_at ASC, m.rowid ASC",
            ListSort::UpdatedAtDesc => "ORDER BY m.updated_at DESC",
        }
    }
}

impl std::str::FromStr for ListSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created_at_desc" => Ok(ListSort::CreatedAtDesc),
            "created_at_asc" => Ok(ListSort::CreatedAtAsc),
            "updated_at_desc" => Ok(ListSort::UpdatedAtDesc),
            _ => Err(format!("Unknown sort order: {}", s)),
        }
    }
}

/// Match mode of the full-text query compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// OR of prefix terms
    #[default]
    Any,
    /// Implicit AND of prefix terms
    All,
    /// NEAR group with a token distance
    Near,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(MatchMode::Any),
            "all" => Ok(MatchMode::All),
            "near" => Ok(MatchMode::Near),
            _ => Err(format!("Unknown match mode: {}", s)),
        }
    }
}

/// A page of memories with the filtered total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPage {
    pub memories: Vec<Memory>,
    /// Total rows matching the filters, independent of limit/offset
    pub total: i64,
}

/// Result of a batch update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateResult {
    pub updated: Vec<MemoryId>,
    pub not_found: Vec<MemoryId>,
}

/// Result of a batch delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDeleteResult {
    pub deleted: Vec<MemoryId>,
    pub not_found: Vec<MemoryId>,
}

/// How `import_memories` treats supplied ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Always insert with a fresh id, ignoring any supplied one
    #[default]
    Insert,
    /// Update when the supplied id exists, otherwise insert with a fresh id
    Upsert,
}

impl std::str::FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(ImportMode::Insert),
            "upsert" => Ok(ImportMode::Upsert),
            _ => Err(format!("Unknown import mode: {}", s)),
        }
    }
}

/// One row of an import payload (an exported `Memory` deserializes into this)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportEntry {
    pub id: Option<MemoryId>,
    #[serde(default)]
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub project: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Result of a batch import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub imported: usize,
    /// Rows skipped for empty content
    pub skipped: usize,
    pub ids: Vec<MemoryId>,
}

/// Full dump of the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: String,
    pub exported_at: String,
    pub memory_count: usize,
    pub memories: Vec<Memory>,
}

/// Result of a physical purge of expired rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResult {
    pub purged: usize,
    pub ids: Vec<MemoryId>,
}

/// Result of a tag rename
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTagResult {
    pub updated: i64,
    pub old_tag: String,
    pub new_tag: String,
}

/// A project namespace with its live memory count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project: String,
    pub count: i64,
}
