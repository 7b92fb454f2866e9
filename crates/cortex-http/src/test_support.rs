//! Test-only helper for wiring a complete [`AppState`] against a fresh
//! temp directory, shared by every route/server test in this crate.

use std::sync::Arc;

use cortex_config::{ConfigOverrides, ConfigStore};
use cortex_download::DownloadService;
use cortex_entities::EntityStore;
use cortex_events::EventBus;
use cortex_loader::EngineLoader;
use cortex_registry::{catalog::CatalogClient, EngineRegistry};
use cortex_threads::ThreadRepository;

use crate::state::AppState;

/// Builds an `AppState` rooted at a leaked temp directory (leaked so the
/// directory outlives the test without threading a guard through every
/// handler call — acceptable churn for a process that exits at test end).
pub fn in_memory_state() -> AppState {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_path_buf();
    std::mem::forget(dir);

    let config = ConfigStore::load(ConfigOverrides {
        data_folder: Some(data_dir.clone()),
        ..Default::default()
    })
    .unwrap();
    let entities = Arc::new(EntityStore::open(&data_dir.join("cortex.db")).unwrap());
    let events = EventBus::new();
    let downloads = Arc::new(DownloadService::with_pool_size(events.clone(), 1));
    let catalog = CatalogClient::new("https://catalog.invalid");
    let registry = Arc::new(EngineRegistry::new(catalog, downloads.clone(), entities.clone(), config.clone()));
    let loader = Arc::new(EngineLoader::new());
    let dispatcher = Arc::new(cortex_dispatch::Dispatcher::new(loader.clone()));
    let threads = Arc::new(ThreadRepository::new(data_dir).unwrap());

    AppState::new(config, entities, events, downloads, registry, loader, dispatcher, threads)
}
