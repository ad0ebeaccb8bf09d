//! Store configuration
//!
//! Each store instance owns its configuration; there are no process-wide
//! singletons.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable naming the database file
pub const ENV_DB_PATH: &str = "ENGRAM_DB_PATH";
/// Environment variable naming the default project namespace
pub const ENV_PROJECT: &str = "ENGRAM_PROJECT";

/// Configuration for a store instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file, or ":memory:"
    pub db_path: String,
    /// Project namespace applied when operations omit one
    pub default_project: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            default_project: "default".to_string(),
        }
    }
}

impl Config {
    /// Build a configuration from `ENGRAM_DB_PATH` / `ENGRAM_PROJECT`
    pub fn from_env() -> Self {
        let db_path = std::env::var(ENV_DB_PATH)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| expand_path(&s))
            .unwrap_or_else(default_db_path);

        let default_project = std::env::var(ENV_PROJECT)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());

        Self {
            db_path,
            default_project,
        }
    }

    /// In-memory configuration for tests and scratch use
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            default_project: "default".to_string(),
        }
    }
}

/// Expand `~` and keep `:memory:` untouched
pub fn expand_path(path: &str) -> String {
    if path == ":memory:" {
        return path.to_string();
    }
    shellexpand::tilde(path).to_string()
}

fn default_db_path() -> String {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".engram")
        .join("memories.db")
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.db_path.ends_with("memories.db"));
        assert_eq!(config.default_project, "default");
    }

    #[test]
    fn test_memory_path_not_expanded() {
        assert_eq!(expand_path(":memory:"), ":memory:");
    }
}
