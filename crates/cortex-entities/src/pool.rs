//! r2d2-pooled `rusqlite` connections plus the schema the rest of this
//! crate's tables assume already exists.
//!
//! The teacher workspace pulls in `rusqlite` directly but never pools it
//! (its SQL usage is a handful of one-shot lookups); every table here is hit
//! concurrently from HTTP handlers, so a pool is the natural fit.

use cortex_core::{Error, Result};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS engines (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    variant TEXT NOT NULL,
    version TEXT NOT NULL,
    engine_type TEXT NOT NULL,
    api_key TEXT,
    url TEXT,
    status TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(name, variant, version)
);

CREATE TABLE IF NOT EXISTS models (
    id TEXT PRIMARY KEY,
    family TEXT NOT NULL,
    variant TEXT NOT NULL,
    file_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    sha256 TEXT,
    status TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(family, variant, file_name)
);

CREATE TABLE IF NOT EXISTS files (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    sha256 TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hardware (
    id TEXT PRIMARY KEY,
    probed_at TEXT NOT NULL,
    os TEXT NOT NULL,
    arch TEXT NOT NULL,
    cuda_driver_version TEXT,
    cuda_major INTEGER,
    notes TEXT NOT NULL DEFAULT ''
);
";

/// Opens (creating if absent) `<data>/cortex.db` and returns a pool whose
/// first connection has already run the schema migration.
pub fn open(db_path: &Path) -> Result<Pool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        Ok(())
    });
    let pool = r2d2::Pool::builder()
        .max_size(8)
        .build(manager)
        .map_err(|e| Error::internal(format!("failed to build sqlite pool: {e}")))?;

    let conn = pool
        .get()
        .map_err(|e| Error::internal(format!("failed to acquire sqlite connection: {e}")))?;
    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::internal(format!("failed to apply schema: {e}")))?;

    Ok(pool)
}

pub fn get(pool: &Pool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::internal(format!("failed to acquire sqlite connection: {e}")))
}
