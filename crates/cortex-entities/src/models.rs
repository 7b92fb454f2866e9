//! The `models` table: installed model weight files, one row per
//! `(family, variant, file_name)`.

use crate::pool::{self, Pool};
use cortex_core::Result;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub family: String,
    pub variant: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub status: String,
    pub metadata: Value,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ModelEntry> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(ModelEntry {
        id: row.get("id")?,
        family: row.get("family")?,
        variant: row.get("variant")?,
        file_name: row.get("file_name")?,
        size_bytes: row.get("size_bytes")?,
        sha256: row.get("sha256")?,
        status: row.get("status")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
    })
}

pub fn upsert(pool: &Pool, entry: &ModelEntry) -> Result<()> {
    let conn = pool::get(pool)?;
    let metadata = serde_json::to_string(&entry.metadata)?;
    conn.execute(
        "INSERT INTO models (id, family, variant, file_name, size_bytes, sha256, status, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(family, variant, file_name) DO UPDATE SET
            size_bytes = excluded.size_bytes,
            sha256 = excluded.sha256,
            status = excluded.status,
            metadata = excluded.metadata",
        params![
            entry.id,
            entry.family,
            entry.variant,
            entry.file_name,
            entry.size_bytes,
            entry.sha256,
            entry.status,
            metadata,
        ],
    )
    .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    Ok(())
}

pub fn list_by_family(pool: &Pool, family: &str) -> Result<Vec<ModelEntry>> {
    let conn = pool::get(pool)?;
    let mut stmt = conn.prepare("SELECT * FROM models WHERE family = ?1 ORDER BY variant")?;
    let rows = stmt
        .query_map(params![family], from_row)
        .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| cortex_core::Error::internal(e.to_string()))
}

pub fn get_by_id(pool: &Pool, id: &str) -> Result<Option<ModelEntry>> {
    let conn = pool::get(pool)?;
    conn.query_row("SELECT * FROM models WHERE id = ?1", params![id], from_row)
        .optional()
        .map_err(|e| cortex_core::Error::internal(e.to_string()))
}

pub fn delete_by_id(pool: &Pool, id: &str) -> Result<bool> {
    let conn = pool::get(pool)?;
    let affected = conn
        .execute("DELETE FROM models WHERE id = ?1", params![id])
        .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    Ok(affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_then_list_by_family() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool::open(&dir.path().join("cortex.db")).unwrap();
        upsert(
            &pool,
            &ModelEntry {
                id: "m1".to_string(),
                family: "llama-cpp".to_string(),
                variant: "linux-amd64-avx2".to_string(),
                file_name: "model.gguf".to_string(),
                size_bytes: 4_000_000_000,
                sha256: Some("abc123".to_string()),
                status: "ready".to_string(),
                metadata: serde_json::json!({}),
            },
        )
        .unwrap();

        let models = list_by_family(&pool, "llama-cpp").unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].file_name, "model.gguf");
    }
}
