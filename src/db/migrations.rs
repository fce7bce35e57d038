// Database migrations
// Migrations are forward-only. Never edit or delete a migration after it ships.

use rusqlite::Connection;
use anyhow::Result;

/// All migrations in order. Each migration is a SQL string.
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Cataloged media files
    CREATE TABLE media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        relative_path TEXT NOT NULL,
        byte_size INTEGER NOT NULL CHECK (byte_size >= 0),
        content_fingerprint TEXT NOT NULL,
        duration_secs REAL,
        width INTEGER,
        height INTEGER,
        fps REAL,
        codec TEXT,
        bitrate INTEGER,
        deleted INTEGER NOT NULL DEFAULT 0,
        duplicate INTEGER NOT NULL DEFAULT 0,
        thumbnail_path TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        last_accessed_at TEXT
    );

    -- Tags (organizing state owned by external collaborators)
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        usage_count INTEGER NOT NULL DEFAULT 0 CHECK (usage_count >= 0),
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE media_tags (
        media_id INTEGER NOT NULL REFERENCES media(id),
        tag_id INTEGER NOT NULL REFERENCES tags(id),
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (media_id, tag_id)
    );

    -- Scan run audit trail
    CREATE TABLE scan_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_token TEXT NOT NULL,
        host TEXT,
        trigger TEXT NOT NULL CHECK (trigger IN ('startup', 'periodic', 'manual')),
        status TEXT NOT NULL DEFAULT 'running'
            CHECK (status IN ('running', 'completed', 'failed', 'cancelled')),
        started_at TEXT NOT NULL DEFAULT (datetime('now')),
        completed_at TEXT,
        scanned INTEGER NOT NULL DEFAULT 0,
        added INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        duplicates_found INTEGER NOT NULL DEFAULT 0,
        errors TEXT NOT NULL DEFAULT '[]',
        heartbeat_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_media_size_fingerprint ON media(byte_size, content_fingerprint);
    CREATE INDEX idx_media_name_size ON media(display_name, byte_size);
    CREATE INDEX idx_media_flags ON media(deleted, duplicate);
    CREATE INDEX idx_media_path ON media(relative_path);
    CREATE INDEX idx_media_tags_tag ON media_tags(tag_id);
    CREATE INDEX idx_scan_runs_status ON scan_runs(status);
    CREATE UNIQUE INDEX idx_scan_runs_single_running ON scan_runs(status) WHERE status = 'running';
    CREATE INDEX idx_scan_runs_started ON scan_runs(started_at);
    "#,
];

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row(
        "PRAGMA user_version",
        [],
        |row| row.get(0)
    )?;
    Ok(version)
}

/// Run all pending migrations (crash-safe)
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = MIGRATIONS.len() as u32;

    // Refuse to open a catalog created by a newer build
    if current_version > target_version {
        anyhow::bail!(
            "Catalog schema version {} is newer than this build supports (max {}). Please upgrade vidshelf.",
            current_version,
            target_version
        );
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(&format!(
            "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
            migration, migration_version
        ))?;

        log::info!("Applied catalog migration {}", migration_version);
    }

    Ok(())
}
