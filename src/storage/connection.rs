//! Database connection management
//!
//! Wraps a single SQLite handle behind a mutex. WAL journaling with relaxed
//! sync, foreign keys on, memory-mapped reads, and a raised prepared
//! statement cache are configured at open; failures there are fatal.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::config::Config;
use crate::error::{EngramError, Result};

/// Storage engine wrapping SQLite
pub struct Storage {
    config: Config,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database with the given configuration
    pub fn open(config: Config) -> Result<Self> {
        let conn = Self::create_connection(&config)?;

        run_migrations(&conn)?;

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a non-persistent store (testing and scratch use)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Config::in_memory())
    }

    fn create_connection(config: &Config) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-8192;
            PRAGMA mmap_size=67108864;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )?;

        conn.set_prepared_statement_cache_capacity(128);

        Ok(conn)
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction; rolls back on error
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Get database path
    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run an integrity check plus a WAL checkpoint in the given mode
    pub fn maintenance(&self, mode: CheckpointMode) -> Result<MaintenanceReport> {
        let conn = self.conn.lock();

        let mut integrity_errors: Vec<String> = Vec::new();
        {
            let mut stmt = conn.prepare("PRAGMA integrity_check")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                let line = row?;
                if line != "ok" {
                    integrity_errors.push(line);
                }
            }
        }

        let wal_checkpoint = conn.query_row(
            &format!("PRAGMA wal_checkpoint({})", mode.as_str()),
            [],
            |row| {
                Ok(WalCheckpoint {
                    busy: row.get(0)?,
                    log: row.get(1)?,
                    checkpointed: row.get(2)?,
                })
            },
        )?;

        Ok(MaintenanceReport {
            integrity_ok: integrity_errors.is_empty(),
            integrity_errors,
            wal_checkpoint,
        })
    }

    /// Write a physical copy of the database beside it
    ///
    /// The copy is produced with `VACUUM INTO`, which is safe under WAL.
    /// Rejected for in-memory stores.
    pub fn backup(&self) -> Result<PathBuf> {
        if self.config.db_path == ":memory:" {
            return Err(EngramError::InvalidInput(
                "cannot back up an in-memory store".to_string(),
            ));
        }

        let db_path = Path::new(&self.config.db_path);
        let stem = db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("memories");
        // Colons replaced with hyphens for filesystem safety
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let backup_path = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}.backup.{}.db", stem, stamp));

        let conn = self.conn.lock();
        conn.execute(
            "VACUUM INTO ?",
            [backup_path.to_string_lossy().as_ref()],
        )?;

        Ok(backup_path)
    }

    /// Run the optimize hook and release the handle
    pub fn close(self) -> Result<()> {
        {
            let conn = self.conn.lock();
            conn.execute_batch("PRAGMA optimize;")?;
        }
        // Remaining clones keep the handle alive until they drop
        Ok(())
    }
}

impl Clone for Storage {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}

/// WAL checkpoint mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointMode {
    #[default]
    Passive,
    Full,
    Restart,
    Truncate,
}

impl CheckpointMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointMode::Passive => "PASSIVE",
            CheckpointMode::Full => "FULL",
            CheckpointMode::Restart => "RESTART",
            CheckpointMode::Truncate => "TRUNCATE",
        }
    }
}

impl std::str::FromStr for CheckpointMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PASSIVE" => Ok(CheckpointMode::Passive),
            "FULL" => Ok(CheckpointMode::Full),
            "RESTART" => Ok(CheckpointMode::Restart),
            "TRUNCATE" => Ok(CheckpointMode::Truncate),
            _ => Err(format!("Unknown checkpoint mode: {}", s)),
        }
    }
}

/// Result of `PRAGMA wal_checkpoint`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalCheckpoint {
    pub busy: i64,
    pub log: i64,
    pub checkpointed: i64,
}

/// Result of a maintenance pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub integrity_ok: bool,
    pub integrity_errors: Vec<String>,
    pub wal_checkpoint: WalCheckpoint,
}
