//! The `hardware` table: a log of host-probe snapshots used to pick engine
//! variants and explain why a variant was (or was not) selected.

use crate::pool::{self, Pool};
use cortex_core::Result;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub id: String,
    pub probed_at: String,
    pub os: String,
    pub arch: String,
    pub cuda_driver_version: Option<String>,
    pub cuda_major: Option<i64>,
    pub notes: String,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<HardwareSnapshot> {
    Ok(HardwareSnapshot {
        id: row.get("id")?,
        probed_at: row.get("probed_at")?,
        os: row.get("os")?,
        arch: row.get("arch")?,
        cuda_driver_version: row.get("cuda_driver_version")?,
        cuda_major: row.get("cuda_major")?,
        notes: row.get("notes")?,
    })
}

pub fn insert(pool: &Pool, snapshot: &HardwareSnapshot) -> Result<()> {
    let conn = pool::get(pool)?;
    conn.execute(
        "INSERT INTO hardware (id, probed_at, os, arch, cuda_driver_version, cuda_major, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            snapshot.id,
            snapshot.probed_at,
            snapshot.os,
            snapshot.arch,
            snapshot.cuda_driver_version,
            snapshot.cuda_major,
            snapshot.notes,
        ],
    )
    .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    Ok(())
}

/// Returns the most recently probed snapshot, if any have been recorded.
pub fn latest(pool: &Pool) -> Result<Option<HardwareSnapshot>> {
    let conn = pool::get(pool)?;
    let mut stmt = conn.prepare("SELECT * FROM hardware ORDER BY probed_at DESC LIMIT 1")?;
    let mut rows = stmt
        .query_map([], from_row)
        .map_err(|e| cortex_core::Error::internal(e.to_string()))?;
    match rows.next() {
        Some(row) => Ok(Some(row.map_err(|e| cortex_core::Error::internal(e.to_string()))?)),
        None => Ok(None),
    }
}
