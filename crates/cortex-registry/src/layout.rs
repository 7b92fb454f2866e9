//! Canonical on-disk layout: `<data>/engines/<family>/<variant>/<version>/`
//! plus the `version.txt` manifest written into it.

use cortex_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub fn install_dir(data_root: &Path, family: &str, variant: &str, version: &str) -> PathBuf {
    data_root.join("engines").join(family).join(variant).join(version)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub name: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

const MANIFEST_FILE: &str = "version.txt";

pub fn write_manifest(dir: &Path, manifest: &VersionManifest) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let body = format!(
        "name={}\nversion={}\ncapabilities={}\n",
        manifest.name,
        manifest.version,
        manifest.capabilities.join(",")
    );
    std::fs::write(dir.join(MANIFEST_FILE), body)?;
    Ok(())
}

pub fn read_manifest(dir: &Path) -> Result<VersionManifest> {
    let raw = std::fs::read_to_string(dir.join(MANIFEST_FILE))?;
    let mut name = None;
    let mut version = None;
    let mut capabilities = Vec::new();
    for line in raw.lines() {
        if let Some((key, value)) = line.split_once('=') {
            match key {
                "name" => name = Some(value.to_string()),
                "version" => version = Some(value.to_string()),
                "capabilities" => {
                    capabilities = value.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect();
                }
                _ => {}
            }
        }
    }
    Ok(VersionManifest {
        name: name.ok_or_else(|| Error::internal("version.txt missing name"))?,
        version: version.ok_or_else(|| Error::internal("version.txt missing version"))?,
        capabilities,
    })
}

/// A variant is installed iff its directory contains both a shared library
/// file and `version.txt`, per spec.md §3.
pub fn is_installed(dir: &Path) -> bool {
    if !dir.join(MANIFEST_FILE).exists() {
        return false;
    }
    matches!(std::fs::read_dir(dir), Ok(entries) if entries.filter_map(|e| e.ok()).any(|e| {
        e.path().extension().and_then(|ext| ext.to_str()).is_some_and(|ext| {
            matches!(ext, "so" | "dll" | "dylib")
        })
    }))
}
