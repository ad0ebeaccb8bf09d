//! Engram - knowledge-graph memory store for AI agents
//!
//! Embedded SQLite store of typed text memories with tags, metadata,
//! project namespaces, TTL, full-text search, directed typed links with
//! inference, and a full audit trail with point-in-time restore.

pub mod config;
pub mod error;
pub mod graph;
pub mod mcp;
pub mod normalize;
pub mod search;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{EngramError, Result};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
