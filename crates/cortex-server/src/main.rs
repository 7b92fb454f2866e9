//! Cortex control-plane server.
//!
//! Wires the Config/Entity/Event/Download/Registry/Loader/Dispatch/Thread
//! components together and fronts them with the HTTP surface. Mirrors
//! `dashflow-registry`'s own `registry_server` binary: parse configuration,
//! build `AppState`, bind, serve until a shutdown signal arrives.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cortex_config::{ConfigOverrides, ConfigStore};
use cortex_dispatch::Dispatcher;
use cortex_download::DownloadService;
use cortex_entities::EntityStore;
use cortex_events::EventBus;
use cortex_http::{ApiConfig, ApiServer};
use cortex_loader::EngineLoader;
use cortex_registry::{catalog::CatalogClient, EngineRegistry};
use cortex_threads::ThreadRepository;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cortex-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cortex local inference control plane", long_about = None)]
struct Cli {
    /// Listen host. Overrides `cortex.yaml` and `CORTEX_HOST`.
    #[arg(long)]
    host: Option<String>,

    /// Listen port. Overrides `cortex.yaml` and `CORTEX_PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Data directory root (`cortex.yaml`, `cortex.db`, engines/, models/,
    /// threads/). Overrides `CORTEX_DATA_FOLDER`.
    #[arg(long)]
    data_folder: Option<std::path::PathBuf>,

    /// Upstream engine catalog base URL.
    #[arg(long, default_value = "https://catalog.cortex.dev")]
    catalog_url: String,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cortex_server=info,cortex_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "cortex-server starting");

    let state = match build_state(&cli).await {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "failed to initialize control plane");
            return ExitCode::FAILURE;
        }
    };

    let config = state.config.get();
    let addr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(host = %config.host, port = config.port, error = %err, "invalid listen address");
            return ExitCode::FAILURE;
        }
    };

    let api_config = ApiConfig::default().with_addr(addr);
    let server = ApiServer::with_state(state, api_config);

    info!(addr = %addr, "cortex HTTP surface starting");

    if let Err(err) = server.run_until(shutdown_signal()).await {
        error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }

    info!("cortex-server shutdown complete");
    ExitCode::SUCCESS
}

async fn build_state(cli: &Cli) -> cortex_core::Result<cortex_http::AppState> {
    let overrides = ConfigOverrides {
        host: cli.host.clone(),
        port: cli.port,
        data_folder: cli.data_folder.clone(),
    };
    let config = ConfigStore::load(overrides)?;
    let data_folder = config.get().data_folder;

    let entities = Arc::new(EntityStore::open(&data_folder.join("cortex.db"))?);
    let events = EventBus::new();
    let downloads = Arc::new(DownloadService::new(events.clone()));
    let catalog = CatalogClient::new(cli.catalog_url.clone());
    let registry = Arc::new(EngineRegistry::new(catalog, downloads.clone(), entities.clone(), config.clone()));
    let loader = Arc::new(EngineLoader::new());
    let dispatcher = Arc::new(Dispatcher::new(loader.clone()));
    let threads = Arc::new(ThreadRepository::new(data_folder)?);

    Ok(cortex_http::AppState::new(
        config, entities, events, downloads, registry, loader, dispatcher, threads,
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
