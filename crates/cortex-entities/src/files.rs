//! The `files` table: on-disk artifacts (downloaded archives, extracted
//! engine binaries) tracked by path, for garbage-collection and integrity
//! reporting.

use crate::pool::{self, Pool};
use cortex_core::Result;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: String,
    pub path: String,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub created_at: String,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<FileEntry> {
    Ok(FileEntry {
        id: row.get("id")?,
        path: row.get("path")?,
        size_bytes: row.get("size_bytes")?,
        sha256: row.get("sha256")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert(pool: &Pool, entry: &FileEntry) -> Result<()> {
    let conn = pool::get(pool)?;
    conn.execute(
        "INSERT INTO files (id, path, size_bytes, sha256, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path) DO UPDATE SET
            size_bytes = excluded.size_bytes,
            sha256 = excluded.sha256",
        params![entry.id, entry.path, entry.size_bytes, entry.sha256, entry.created_at],
    )
    .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    Ok(())
}

pub fn get_by_path(pool: &Pool, path: &str) -> Result<Option<FileEntry>> {
    let conn = pool::get(pool)?;
    conn.query_row("SELECT * FROM files WHERE path = ?1", params![path], from_row)
        .optional()
        .map_err(|e| cortex_core::Error::internal(e.to_string()))
}

pub fn delete_by_path(pool: &Pool, path: &str) -> Result<bool> {
    let conn = pool::get(pool)?;
    let affected = conn
        .execute("DELETE FROM files WHERE path = ?1", params![path])
        .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool::open(&dir.path().join("cortex.db")).unwrap();
        insert(
            &pool,
            &FileEntry {
                id: "f1".to_string(),
                path: "/data/engines/llama-cpp/linux-amd64-avx2/0.1.0/version.txt".to_string(),
                size_bytes: 5,
                sha256: None,
                created_at: "2026-07-26T00:00:00Z".to_string(),
            },
        )
        .unwrap();

        let found = get_by_path(&pool, "/data/engines/llama-cpp/linux-amd64-avx2/0.1.0/version.txt")
            .unwrap()
            .unwrap();
        assert_eq!(found.size_bytes, 5);
    }
}
