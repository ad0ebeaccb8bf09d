//! Database schema and migrations
//!
//! The base schema owns the `memories` table, the FTS5 index over
//! content/category/tags, and the triggers that keep the index coherent.
//! Versioned migrations layer TTL, links, history, projects, and weighted
//! edges on top. Every step is additive and idempotent.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 5;

/// Run the base schema and all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    init_base_schema(conn)?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version < 3 {
        migrate_v3(conn)?;
    }

    if current_version < 4 {
        migrate_v4(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v5(conn)?;
    }

    Ok(())
}

/// Check whether a table has a named column
fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?) WHERE name = ?",
        [table, column],
        |row| row.get(0),
    )
    .unwrap_or(false)
}

/// Authoritative memories table, FTS index, and FTS coherence triggers
fn init_base_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
        CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);

        -- Full-text index over the authoritative table
        CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            content,
            category,
            tags,
            content='memories',
            tokenize='porter unicode61'
        );

        -- Triggers keeping FTS coherent with every mutation
        CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memories_fts(rowid, content, category, tags)
            VALUES (NEW.rowid, NEW.content, NEW.category, NEW.tags);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, category, tags)
            VALUES ('delete', OLD.rowid, OLD.content, OLD.category, OLD.tags);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memories_fts(memories_fts, rowid, content, category, tags)
            VALUES ('delete', OLD.rowid, OLD.content, OLD.category, OLD.tags);
            INSERT INTO memories_fts(rowid, content, category, tags)
            VALUES (NEW.rowid, NEW.content, NEW.category, NEW.tags);
        END;
        "#,
    )?;

    Ok(())
}

/// Memory expiration (v1): nullable expires_at + lookup index
fn migrate_v1(conn: &Connection) -> Result<()> {
    if !has_column(conn, "memories", "expires_at") {
        conn.execute("ALTER TABLE memories ADD COLUMN expires_at TEXT", [])?;
    }

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_memories_expires_at ON memories(expires_at)
            WHERE expires_at IS NOT NULL;

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    tracing::info!("Migration v1 complete: expires_at added");

    Ok(())
}

/// Directed typed links (v2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memory_links (
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            relation TEXT NOT NULL DEFAULT 'related',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (from_id, to_id),
            FOREIGN KEY (from_id) REFERENCES memories(id) ON DELETE CASCADE,
            FOREIGN KEY (to_id) REFERENCES memories(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_links_to ON memory_links(to_id);

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )?;

    tracing::info!("Migration v2 complete: memory_links added");

    Ok(())
}

/// Versioned history trail (v3): table, index, and history triggers
///
/// Snapshots are post-images; the delete trigger fires AFTER DELETE so the
/// old row is still visible and becomes the final pre-image entry.
fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memory_history (
            history_id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            expires_at TEXT,
            changed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_history_memory
            ON memory_history(memory_id, changed_at DESC);

        CREATE TRIGGER IF NOT EXISTS memories_history_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, expires_at)
            VALUES (NEW.id, 'create', NEW.content, NEW.category, NEW.tags, NEW.metadata, NEW.expires_at);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_history_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, expires_at)
            VALUES (NEW.id, 'update', NEW.content, NEW.category, NEW.tags, NEW.metadata, NEW.expires_at);
        END;

        CREATE TRIGGER IF NOT EXISTS memories_history_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, expires_at)
            VALUES (OLD.id, 'delete', OLD.content, OLD.category, OLD.tags, OLD.metadata, OLD.expires_at);
        END;

        INSERT INTO schema_version (version) VALUES (3);
        "#,
    )?;

    tracing::info!("Migration v3 complete: memory_history added");

    Ok(())
}

/// Project namespaces (v4): column on memories and history, indices,
/// history triggers recreated to snapshot the project
fn migrate_v4(conn: &Connection) -> Result<()> {
    if !has_column(conn, "memories", "project") {
        conn.execute(
            "ALTER TABLE memories ADD COLUMN project TEXT NOT NULL DEFAULT 'default'",
            [],
        )?;
    }

    if !has_column(conn, "memory_history", "project") {
        conn.execute(
            "ALTER TABLE memory_history ADD COLUMN project TEXT NOT NULL DEFAULT 'default'",
            [],
        )?;
    }

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project);
        CREATE INDEX IF NOT EXISTS idx_memories_project_category ON memories(project, category);

        DROP TRIGGER IF EXISTS memories_history_ai;
        DROP TRIGGER IF EXISTS memories_history_au;
        DROP TRIGGER IF EXISTS memories_history_ad;

        CREATE TRIGGER memories_history_ai AFTER INSERT ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, project, expires_at)
            VALUES (NEW.id, 'create', NEW.content, NEW.category, NEW.tags, NEW.metadata, NEW.project, NEW.expires_at);
        END;

        CREATE TRIGGER memories_history_au AFTER UPDATE ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, project, expires_at)
            VALUES (NEW.id, 'update', NEW.content, NEW.category, NEW.tags, NEW.metadata, NEW.project, NEW.expires_at);
        END;

        CREATE TRIGGER memories_history_ad AFTER DELETE ON memories BEGIN
            INSERT INTO memory_history (memory_id, operation, content, category, tags, metadata, project, expires_at)
            VALUES (OLD.id, 'delete', OLD.content, OLD.category, OLD.tags, OLD.metadata, OLD.project, OLD.expires_at);
        END;

        INSERT INTO schema_version (version) VALUES (4);
        "#,
    )?;

    tracing::info!("Migration v4 complete: project namespaces added");

    Ok(())
}

/// Weighted, flagged edges (v5)
fn migrate_v5(conn: &Connection) -> Result<()> {
    if !has_column(conn, "memory_links", "weight") {
        conn.execute(
            "ALTER TABLE memory_links ADD COLUMN weight REAL NOT NULL DEFAULT 1.0",
            [],
        )?;
    }

    if !has_column(conn, "memory_links", "auto_generated") {
        conn.execute(
            "ALTER TABLE memory_links ADD COLUMN auto_generated INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_links_auto ON memory_links(auto_generated);

        INSERT INTO schema_version (version) VALUES (5);
        "#,
    )?;

    tracing::info!("Migration v5 complete: link weight + auto_generated added");

    Ok(())
}
