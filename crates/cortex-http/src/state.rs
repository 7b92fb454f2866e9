//! Shared application state threaded through every route handler, mirroring
//! the teacher's `AppState`: a `Clone` struct of `Arc`-wrapped service
//! handles built once at startup and cheaply cloned per request.

use cortex_config::ConfigStore;
use cortex_dispatch::{Dispatcher, FamilyPromptConfig};
use cortex_download::DownloadService;
use cortex_entities::EntityStore;
use cortex_events::EventBus;
use cortex_loader::EngineLoader;
use cortex_registry::EngineRegistry;
use cortex_threads::ThreadRepository;
use dashmap::DashMap;
use std::sync::Arc;

/// Server-level settings not already covered by [`cortex_config::Config`]:
/// the request body size cap enforced by `RequestBodyLimitLayer`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_body_size: usize,
}

/// 50 MiB, matching the teacher's own default.
const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub entities: Arc<EntityStore>,
    pub events: EventBus,
    pub downloads: Arc<DownloadService>,
    pub registry: Arc<EngineRegistry>,
    pub loader: Arc<EngineLoader>,
    pub dispatcher: Arc<Dispatcher>,
    pub threads: Arc<ThreadRepository>,
    /// Prompt-formatting config per loaded family, supplied at
    /// `POST /inferences/server/loadmodel` time since nothing in the
    /// Entity Store or Config Store persists it.
    pub family_prompts: Arc<DashMap<String, FamilyPromptConfig>>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigStore>,
        entities: Arc<EntityStore>,
        events: EventBus,
        downloads: Arc<DownloadService>,
        registry: Arc<EngineRegistry>,
        loader: Arc<EngineLoader>,
        dispatcher: Arc<Dispatcher>,
        threads: Arc<ThreadRepository>,
    ) -> Self {
        Self {
            config,
            entities,
            events,
            downloads,
            registry,
            loader,
            dispatcher,
            threads,
            family_prompts: Arc::new(DashMap::new()),
            server: Arc::new(ServerConfig::default()),
        }
    }

    pub fn with_server_config(mut self, server: ServerConfig) -> Self {
        self.server = Arc::new(server);
        self
    }

    /// The prompt config a family was registered with, or a default for one
    /// whose `loadmodel` call never specified it.
    pub fn family_prompt(&self, family: &str) -> FamilyPromptConfig {
        self.family_prompts.get(family).map(|entry| entry.clone()).unwrap_or_default()
    }
}
