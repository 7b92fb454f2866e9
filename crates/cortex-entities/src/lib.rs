//! The Entity Store (C2): a `rusqlite`-backed relational store, pooled with
//! `r2d2`, holding the four tables the rest of the control plane indexes
//! against: `engines`, `models`, `files`, `hardware`.
//!
//! All mutations are single-statement transactions; reads are
//! snapshot-consistent against whichever connection the pool hands out.
//! There is no retry layer here — a caller that hits a transient SQLite
//! busy error sees it as `ErrorKind::Internal` and decides for itself
//! whether to retry.

pub mod engines;
pub mod files;
pub mod hardware;
pub mod models;
pub mod pool;

use cortex_core::Result;
use pool::Pool;
use std::path::Path;

pub use engines::{EngineEntry, EngineStatus};
pub use files::FileEntry;
pub use hardware::HardwareSnapshot;
pub use models::ModelEntry;

/// Handle to the opened SQLite database shared by all four table modules.
#[derive(Clone)]
pub struct EntityStore {
    pool: Pool,
}

impl EntityStore {
    /// Opens (creating if absent) `<data>/cortex.db`, applying the schema
    /// migration on the first connection.
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            pool: pool::open(db_path)?,
        })
    }

    pub fn engines(&self) -> &Pool {
        &self.pool
    }

    pub fn models(&self) -> &Pool {
        &self.pool
    }

    pub fn files(&self) -> &Pool {
        &self.pool
    }

    pub fn hardware(&self) -> &Pool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_all_four_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntityStore::open(&dir.path().join("cortex.db")).unwrap();
        assert!(engines::list(store.engines()).unwrap().is_empty());
        assert!(hardware::latest(store.hardware()).unwrap().is_none());
    }
}
