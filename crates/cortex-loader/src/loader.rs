//! The Engine Loader (C5): owns a `family → loaded plugin handle` table,
//! enforces the data-driven conflict matrix, and hands out refcounted
//! borrows to the Dispatcher.

use crate::native::{find_library, NativeEngine};
use crate::plugin::EnginePlugin;
use crate::remote::{RemoteEngine, RemoteEngineConfig};
use cortex_core::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-family metadata the loader needs to decide how to load it and which
/// other families it conflicts with. Populated by the caller (the server's
/// wiring layer), not discovered automatically.
#[derive(Debug, Clone)]
pub enum FamilySource {
    /// Local native engine: `install_dir` is the canonical layout directory
    /// containing the shared library and `version.txt`.
    Local { install_dir: std::path::PathBuf },
    Remote { config: RemoteEngineConfig },
}

#[derive(Debug, Clone, Default)]
pub struct FamilyMetadata {
    /// Families that must be unloaded before this one can load, per
    /// spec.md §4.5's data-driven conflict matrix (e.g. two CUDA-runtime
    /// families that cannot share a process's search path).
    pub conflicts_with: Vec<String>,
}

struct LoadedEngine {
    plugin: Arc<dyn EnginePlugin>,
    borrow_count: AtomicUsize,
}

/// Released when a [`crate::EngineLoader::borrow`] guard drops, letting a
/// pending `unload` proceed.
pub struct BorrowedHandle {
    plugin: Arc<dyn EnginePlugin>,
    family: String,
    table: Arc<DashMap<String, LoadedEngine>>,
}

impl BorrowedHandle {
    pub fn plugin(&self) -> &Arc<dyn EnginePlugin> {
        &self.plugin
    }
}

impl Drop for BorrowedHandle {
    fn drop(&mut self) {
        if let Some(entry) = self.table.get(&self.family) {
            entry.borrow_count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

const UNLOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct EngineLoader {
    table: Arc<DashMap<String, LoadedEngine>>,
    metadata: DashMap<String, FamilyMetadata>,
}

impl EngineLoader {
    pub fn new() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
            metadata: DashMap::new(),
        }
    }

    pub fn set_metadata(&self, family: &str, metadata: FamilyMetadata) {
        self.metadata.insert(family.to_string(), metadata);
    }

    pub fn is_loaded(&self, family: &str) -> bool {
        self.table.contains_key(family)
    }

    /// Families currently holding a loaded plugin handle, in no particular
    /// order. Backs the server's model-listing endpoint.
    pub fn loaded_families(&self) -> Vec<String> {
        self.table.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Loads `family` from `source`. Double-load is idempotent and returns
    /// success without re-opening the library, per spec.md §4.5.
    pub async fn load(&self, family: &str, source: FamilySource) -> Result<()> {
        if self.is_loaded(family) {
            return Ok(());
        }

        self.unload_conflicts(family).await?;

        let plugin: Arc<dyn EnginePlugin> = match source {
            FamilySource::Local { install_dir } => {
                let library_path = find_library(&install_dir)?;
                let engine = NativeEngine::load(&library_path)?;
                Arc::new(engine)
            }
            FamilySource::Remote { config } => Arc::new(RemoteEngine::new(config)?),
        };

        self.table.insert(
            family.to_string(),
            LoadedEngine {
                plugin,
                borrow_count: AtomicUsize::new(0),
            },
        );
        Ok(())
    }

    /// Unloads `family` once every outstanding [`BorrowedHandle`] has been
    /// released. Blocks (sleep-polling, matching the dispatcher's own gating
    /// style) rather than failing on first contention.
    pub async fn unload(&self, family: &str) -> Result<()> {
        self.unload_with_deadline(family, None).await
    }

    async fn unload_with_deadline(&self, family: &str, deadline: Option<Instant>) -> Result<()> {
        loop {
            let Some((_, engine)) = self.table.remove_if(family, |_, e| e.borrow_count.load(Ordering::Acquire) == 0) else {
                if !self.table.contains_key(family) {
                    return Ok(());
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(Error::engine_busy(format!("{family} still has outstanding borrows")));
                    }
                }
                tokio::time::sleep(UNLOAD_POLL_INTERVAL).await;
                continue;
            };
            drop(engine);
            return Ok(());
        }
    }

    async fn unload_conflicts(&self, family: &str) -> Result<()> {
        let conflicts = self
            .metadata
            .get(family)
            .map(|m| m.conflicts_with.clone())
            .unwrap_or_default();
        for other in conflicts {
            if self.is_loaded(&other) {
                tracing::info!(family, conflicts_with = %other, "unloading conflicting engine");
                self.unload(&other).await?;
            }
        }
        Ok(())
    }

    /// Borrows the loaded handle for `family` for the duration of one
    /// request. Fails with `NotFound` if the family is not currently loaded.
    pub fn borrow(&self, family: &str) -> Result<BorrowedHandle> {
        let entry = self
            .table
            .get(family)
            .ok_or_else(|| Error::not_found(format!("engine {family} is not loaded")))?;
        entry.borrow_count.fetch_add(1, Ordering::AcqRel);
        Ok(BorrowedHandle {
            plugin: entry.plugin.clone(),
            family: family.to_string(),
            table: self.table.clone(),
        })
    }
}

impl Default for EngineLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteEngineConfig;

    fn remote_source() -> FamilySource {
        FamilySource::Remote {
            config: RemoteEngineConfig {
                base_url: "https://api.example.test".to_string(),
                api_key: None,
                capabilities: vec!["chat".to_string()],
            },
        }
    }

    #[tokio::test]
    async fn load_then_is_loaded() {
        let loader = EngineLoader::new();
        loader.load("openai-proxy", remote_source()).await.unwrap();
        assert!(loader.is_loaded("openai-proxy"));
    }

    #[tokio::test]
    async fn double_load_is_idempotent() {
        let loader = EngineLoader::new();
        loader.load("openai-proxy", remote_source()).await.unwrap();
        loader.load("openai-proxy", remote_source()).await.unwrap();
        assert!(loader.is_loaded("openai-proxy"));
    }

    #[tokio::test]
    async fn borrow_then_unload_waits_for_release() {
        let loader = EngineLoader::new();
        loader.load("openai-proxy", remote_source()).await.unwrap();
        let handle = loader.borrow("openai-proxy").unwrap();

        let deadline = Instant::now() + Duration::from_millis(200);
        let unload_result = tokio::time::timeout(Duration::from_millis(500), async {
            loader.unload_with_deadline("openai-proxy", Some(deadline)).await
        });

        drop(handle);
        assert!(unload_result.await.unwrap().is_ok());
        assert!(!loader.is_loaded("openai-proxy"));
    }

    #[tokio::test]
    async fn unload_with_deadline_times_out_while_borrowed() {
        let loader = EngineLoader::new();
        loader.load("openai-proxy", remote_source()).await.unwrap();
        let _handle = loader.borrow("openai-proxy").unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let result = loader.unload_with_deadline("openai-proxy", Some(deadline)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unload_unknown_family_is_ok() {
        let loader = EngineLoader::new();
        assert!(loader.unload("nonexistent").await.is_ok());
    }

    #[tokio::test]
    async fn loaded_families_reflects_table_contents() {
        let loader = EngineLoader::new();
        assert!(loader.loaded_families().is_empty());
        loader.load("openai-proxy", remote_source()).await.unwrap();
        assert_eq!(loader.loaded_families(), vec!["openai-proxy".to_string()]);
    }

    #[tokio::test]
    async fn borrow_unloaded_family_is_not_found() {
        let loader = EngineLoader::new();
        let err = loader.borrow("nonexistent").unwrap_err();
        assert_eq!(err.kind, cortex_core::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn loading_conflicting_family_unloads_the_other() {
        let loader = EngineLoader::new();
        loader.set_metadata(
            "cuda-family-b",
            FamilyMetadata {
                conflicts_with: vec!["cuda-family-a".to_string()],
            },
        );
        loader.load("cuda-family-a", remote_source()).await.unwrap();
        assert!(loader.is_loaded("cuda-family-a"));

        loader.load("cuda-family-b", remote_source()).await.unwrap();
        assert!(!loader.is_loaded("cuda-family-a"));
        assert!(loader.is_loaded("cuda-family-b"));
    }
}
