//! Config Store (C1): a single serialized YAML document on disk plus an
//! in-memory cached copy behind a mutex.
//!
//! On missing file, defaults are written. On a file missing known keys,
//! defaults are merged in and the file is rewritten once. Command-line
//! overrides (via [`ConfigOverrides`]) always win over both the file and
//! environment variables.

pub mod env_vars;

use cortex_core::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A persisted default-variant selection for one engine family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultVariant {
    pub version: String,
    pub variant: String,
}

/// The full configuration document, serialized to `<data>/cortex.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_folder: PathBuf,
    /// CORS allow-list. `["*"]` mirrors any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Bearer tokens accepted on the HTTP surface. Empty means the surface
    /// is unauthenticated (acceptable: it is local-only per spec.md §1).
    pub tokens: Vec<String>,
    /// Per-family default variant selection, set via `SetDefault`.
    #[serde(default)]
    pub default_engine_variants: BTreeMap<String, DefaultVariant>,
}

impl Config {
    /// Defaults written when no config file exists yet: listen host
    /// `127.0.0.1`, a default port, a default data folder under the user's
    /// home, a permissive CORS list, and empty tokens.
    pub fn defaults() -> Self {
        let data_folder = dirs_data_folder();
        Self {
            host: "127.0.0.1".to_string(),
            port: 39281,
            data_folder,
            cors_allowed_origins: vec!["*".to_string()],
            tokens: Vec::new(),
            default_engine_variants: BTreeMap::new(),
        }
    }

    /// Merges any field that is present in `defaults()` but (conceptually)
    /// missing from an older document. Since `Config` always deserializes
    /// fully today, the only field that can be "missing" from an on-disk
    /// document written by an older version is `default_engine_variants`
    /// (defaulted via serde); this performs the explicit merge pass spec.md
    /// calls for so future field additions have a home.
    fn merged_with_defaults(self) -> (Self, bool) {
        let defaults = Self::defaults();
        let mut changed = false;
        let mut merged = self;
        if merged.host.is_empty() {
            merged.host = defaults.host;
            changed = true;
        }
        if merged.port == 0 {
            merged.port = defaults.port;
            changed = true;
        }
        (merged, changed)
    }
}

fn dirs_data_folder() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".cortex")
}

/// Overrides supplied on the command line; these always win over the file
/// and environment variables. All fields are optional so a partial override
/// can be applied.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_folder: Option<PathBuf>,
}

/// A `MutF: FnOnce(&mut Config)` callback handed to [`ConfigStore::update`].
pub type Mutator<'a> = Box<dyn FnOnce(&mut Config) + 'a>;

/// The Config Store: loads/saves `cortex.yaml`, caches the parsed document
/// behind a mutex, and exposes snapshot reads plus exclusive updates.
pub struct ConfigStore {
    path: PathBuf,
    cache: Mutex<Config>,
}

/// Byte-order mark Cortex prefixes onto every `cortex.yaml` it writes, per
/// spec.md §4.1 ("UTF-8 with BOM on write"). `serde_yml` does not emit one
/// itself, so it is prepended explicitly.
const UTF8_BOM: &str = "\u{feff}";

impl ConfigStore {
    /// Resolves `<exe-dir>/cortex.yaml` (or an override directory), loading
    /// it if present and writing defaults otherwise. CLI overrides and
    /// environment variables are applied on top of whatever was loaded.
    pub fn load(overrides: ConfigOverrides) -> Result<Arc<Self>> {
        let data_folder = overrides
            .data_folder
            .clone()
            .or_else(|| env_vars::env_string(env_vars::CORTEX_DATA_FOLDER).map(PathBuf::from))
            .unwrap_or_else(dirs_data_folder);
        std::fs::create_dir_all(&data_folder)?;
        let path = data_folder.join("cortex.yaml");

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw);
            let parsed: Config = serde_yml::from_str(raw)
                .map_err(|e| Error::bad_request(format!("invalid cortex.yaml: {e}")))?;
            let (merged, changed) = parsed.merged_with_defaults();
            if changed {
                write_config(&path, &merged)?;
            }
            merged
        } else {
            let defaults = Config {
                data_folder: data_folder.clone(),
                ..Config::defaults()
            };
            write_config(&path, &defaults)?;
            defaults
        };

        config.data_folder = data_folder;
        if let Some(host) = overrides
            .host
            .or_else(|| env_vars::env_string(env_vars::CORTEX_HOST))
        {
            config.host = host;
        }
        if let Some(port) = overrides.port.or_else(|| env_vars::env_u16(env_vars::CORTEX_PORT)) {
            config.port = port;
        }

        Ok(Arc::new(Self {
            path,
            cache: Mutex::new(config),
        }))
    }

    /// Returns a snapshot of the current configuration by value.
    pub fn get(&self) -> Config {
        self.cache.lock().clone()
    }

    /// Applies `mutator` to a clone of the cached config, writes the result
    /// to disk, then replaces the cache. Exclusive: only one `update` runs
    /// at a time per store.
    pub fn update(&self, mutator: Mutator<'_>) -> Result<Config> {
        let mut guard = self.cache.lock();
        let mut next = guard.clone();
        mutator(&mut next);
        write_config(&self.path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_config(path: &Path, config: &Config) -> Result<()> {
    let yaml = serde_yml::to_string(config)
        .map_err(|e| Error::internal(format!("failed to serialize cortex.yaml: {e}")))?;
    let mut contents = String::with_capacity(UTF8_BOM.len() + yaml.len());
    contents.push_str(UTF8_BOM);
    contents.push_str(&yaml);
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides_for(dir: &Path) -> ConfigOverrides {
        ConfigOverrides {
            data_folder: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_writes_defaults_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(overrides_for(dir.path())).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with(UTF8_BOM));
        assert_eq!(store.get().host, "127.0.0.1");
    }

    #[test]
    fn update_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(overrides_for(dir.path())).unwrap();
        store
            .update(Box::new(|c| {
                c.default_engine_variants.insert(
                    "llama-cpp".to_string(),
                    DefaultVariant {
                        version: "0.1.0".to_string(),
                        variant: "linux-amd64-avx2".to_string(),
                    },
                );
            }))
            .unwrap();

        // Reload from disk entirely, simulating a process restart.
        let reloaded = ConfigStore::load(overrides_for(dir.path())).unwrap();
        let cfg = reloaded.get();
        assert_eq!(
            cfg.default_engine_variants.get("llama-cpp").unwrap().version,
            "0.1.0"
        );
    }

    #[test]
    fn cli_override_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(overrides_for(dir.path())).unwrap();
        drop(store);

        let mut overrides = overrides_for(dir.path());
        overrides.port = Some(9999);
        let store = ConfigStore::load(overrides).unwrap();
        assert_eq!(store.get().port, 9999);
    }
}
