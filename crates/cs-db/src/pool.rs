//! Connection pool management for SQLite via r2d2.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;
use cs_core::{Error, Result};

use crate::migrations;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Type alias for the database connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Type alias for a pooled database connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Initialize a database pool backed by a file on disk.
///
/// Creates the parent directory and SQLite file if needed, configures every
/// new connection (foreign keys, WAL, busy timeout) and runs pending
/// migrations.
pub fn init_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
    });

    let pool = Pool::builder()
        .max_size(8)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;
    tracing::debug!(path = %db_path.display(), "Database ready");

    Ok(pool)
}

/// Initialize an in-memory database pool (useful for tests).
///
/// Each call creates a uniquely-named shared-cache in-memory database so
/// that parallel tests do not interfere with each other. Shared-cache
/// connections fail fast on table locks instead of waiting, so the pool
/// hands out a single connection at a time.
pub fn init_memory_pool() -> Result<DbPool> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:clipshare_mem_{n}?mode=memory&cache=shared");

    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create in-memory pool: {e}")))?;

    let conn = get_conn(&pool)?;
    migrations::run_migrations(&conn)?;

    Ok(pool)
}

/// Convenience helper to get a connection from the pool.
pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pools_are_isolated() {
        let a = init_memory_pool().unwrap();
        let b = init_memory_pool().unwrap();
        get_conn(&a)
            .unwrap()
            .execute(
                "INSERT INTO media (id, media_type, original_name, original_path, retention_days,
                                    created_at, expires_at)
                 VALUES ('ABCD2345', 'video', 'a.mp4', '/a.mp4', 7, 'x', 'y')",
                [],
            )
            .unwrap();

        let count = |pool: &DbPool| -> i64 {
            get_conn(pool)
                .unwrap()
                .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count(&a), 1);
        assert_eq!(count(&b), 0);
    }

    #[test]
    fn test_file_pool_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("nested/clipshare.db")).unwrap();
        let conn = get_conn(&pool).unwrap();

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipshare.db");
        drop(init_pool(&path).unwrap());
        let pool = init_pool(&path).unwrap();
        let conn = get_conn(&pool).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
