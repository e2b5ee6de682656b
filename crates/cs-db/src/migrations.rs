//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use cs_core::{Error, Result};

/// V1: media, per-codec variants, and the job queue.
const V1_INITIAL: &str = r#"
CREATE TABLE media (
    id             TEXT PRIMARY KEY,
    media_type     TEXT NOT NULL,
    original_name  TEXT NOT NULL,
    original_path  TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    error_message  TEXT,
    retention_days INTEGER NOT NULL,
    converted_path TEXT,
    codec          TEXT,
    width          INTEGER,
    height         INTEGER,
    file_size      INTEGER,
    thumb_path     TEXT,
    probe_json     TEXT,
    created_at     TEXT NOT NULL,
    expires_at     TEXT NOT NULL
);
CREATE INDEX idx_media_expires ON media(expires_at);

CREATE TABLE media_variants (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    media_id      TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    codec         TEXT NOT NULL,
    path          TEXT,
    file_size     INTEGER,
    width         INTEGER,
    height        INTEGER,
    status        TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    created_at    TEXT NOT NULL,
    UNIQUE (media_id, codec)
);

CREATE TABLE jobs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    media_id      TEXT NOT NULL REFERENCES media(id) ON DELETE CASCADE,
    kind          TEXT NOT NULL,
    codec         TEXT,
    fps           INTEGER,
    status        TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    attempts      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    completed_at  TEXT
);
CREATE INDEX idx_jobs_claim ON jobs(status, created_at, id);
CREATE INDEX idx_jobs_media ON jobs(media_id);
"#;

/// Ordered list of `(version, sql)` pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Apply every migration not yet recorded in `schema_migrations`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [version])
            .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for t in ["media", "media_variants", "jobs", "schema_migrations"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [t],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "table {t} should exist");
        }
    }

    #[test]
    fn test_variant_pair_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO media (id, media_type, original_name, original_path, retention_days,
                                created_at, expires_at)
             VALUES ('ABCD2345', 'video', 'a.mp4', '/a.mp4', 7, 'x', 'y')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO media_variants (media_id, codec, created_at)
                      VALUES ('ABCD2345', 'av1', 'x')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
