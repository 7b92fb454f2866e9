//! The `engines` table: one row per installed `(name, variant, version)`
//! triple, whether a locally loaded native engine or a registered remote
//! HTTPS engine.

use crate::pool::{self, Pool};
use cortex_core::{Error, Result};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    NotInitialized,
    Ready,
    Missing,
    Error,
}

impl EngineStatus {
    fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::NotInitialized => "not_initialized",
            EngineStatus::Ready => "ready",
            EngineStatus::Missing => "missing",
            EngineStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "ready" => EngineStatus::Ready,
            "missing" => EngineStatus::Missing,
            "error" => EngineStatus::Error,
            _ => EngineStatus::NotInitialized,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEntry {
    pub id: String,
    pub name: String,
    pub variant: String,
    pub version: String,
    pub engine_type: String,
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub status: EngineStatus,
    pub metadata: Value,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<EngineEntry> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(EngineEntry {
        id: row.get("id")?,
        name: row.get("name")?,
        variant: row.get("variant")?,
        version: row.get("version")?,
        engine_type: row.get("engine_type")?,
        api_key: row.get("api_key")?,
        url: row.get("url")?,
        status: EngineStatus::parse(&row.get::<_, String>("status")?),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
    })
}

/// Inserts a new engine row, or updates the existing one sharing the same
/// `(name, variant, version)` key. Spec.md §4.2: all mutations are
/// single-statement transactions; no retries.
pub fn upsert(pool: &Pool, entry: &EngineEntry) -> Result<()> {
    let conn = pool::get(pool)?;
    let metadata = serde_json::to_string(&entry.metadata)?;
    conn.execute(
        "INSERT INTO engines (id, name, variant, version, engine_type, api_key, url, status, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(name, variant, version) DO UPDATE SET
            engine_type = excluded.engine_type,
            api_key = excluded.api_key,
            url = excluded.url,
            status = excluded.status,
            metadata = excluded.metadata",
        params![
            entry.id,
            entry.name,
            entry.variant,
            entry.version,
            entry.engine_type,
            entry.api_key,
            entry.url,
            entry.status.as_str(),
            metadata,
        ],
    )
    .map_err(map_rusqlite_err)?;
    Ok(())
}

pub fn list(pool: &Pool) -> Result<Vec<EngineEntry>> {
    let conn = pool::get(pool)?;
    let mut stmt = conn.prepare("SELECT * FROM engines ORDER BY name, variant, version")?;
    let rows = stmt
        .query_map([], from_row)
        .map_err(|e| Error::internal(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::internal(e.to_string()))
}

pub fn get_by_id(pool: &Pool, id: &str) -> Result<Option<EngineEntry>> {
    let conn = pool::get(pool)?;
    conn.query_row("SELECT * FROM engines WHERE id = ?1", params![id], from_row)
        .optional()
        .map_err(|e| Error::internal(e.to_string()))
}

pub fn get_by_name_and_variant(
    pool: &Pool,
    name: &str,
    variant: &str,
) -> Result<Option<EngineEntry>> {
    let conn = pool::get(pool)?;
    conn.query_row(
        "SELECT * FROM engines WHERE name = ?1 AND variant = ?2 ORDER BY version DESC LIMIT 1",
        params![name, variant],
        from_row,
    )
    .optional()
    .map_err(|e| Error::internal(e.to_string()))
}

pub fn delete_by_id(pool: &Pool, id: &str) -> Result<bool> {
    let conn = pool::get(pool)?;
    let affected = conn
        .execute("DELETE FROM engines WHERE id = ?1", params![id])
        .map_err(|e| Error::internal(e.to_string()))?;
    Ok(affected > 0)
}

fn map_rusqlite_err(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ref sqlite_err, _) = err {
        if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::already_exists(format!("engine already registered: {err}"));
        }
    }
    Error::internal(err.to_string())
}
