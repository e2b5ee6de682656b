//! cs-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, row mapping, per-table query modules, and the
//! [`SqliteStore`] / [`SqliteJobQueue`] implementations of the pipeline's
//! persistence traits.

pub mod migrations;
pub mod pool;
pub mod queries;
pub mod rows;
pub mod store;

pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
pub use store::{SqliteJobQueue, SqliteStore};
