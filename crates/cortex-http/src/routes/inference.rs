//! Inference-server lifecycle: `POST /inferences/server/loadmodel`,
//! `POST /inferences/server/unloadmodel`, `GET /inferences/server/models`.
//!
//! These sit a layer below the Engine Registry's install/uninstall: loading
//! assumes the variant is already installed (or is a remote family) and
//! only manages the in-process [`cortex_loader::EngineLoader`] table.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;
use cortex_dispatch::FamilyPromptConfig;
use cortex_loader::{FamilySource, RemoteEngineConfig};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inferences/server/loadmodel", post(load_model))
        .route("/inferences/server/unloadmodel", post(unload_model))
        .route("/inferences/server/models", get(list_models))
}

#[derive(Debug, Deserialize)]
struct LoadModelRequest {
    model: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    variant: Option<String>,
    /// Present only for `FamilySource::Remote` families.
    #[serde(default)]
    remote: Option<RemoteSpec>,
    #[serde(default)]
    multimodal: bool,
    #[serde(default)]
    preprompt: String,
    #[serde(default)]
    user_turn_marker: String,
}

#[derive(Debug, Deserialize)]
struct RemoteSpec {
    base_url: String,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
struct LoadModelResponse {
    model: String,
    loaded: bool,
}

async fn load_model(State(state): State<AppState>, Json(request): Json<LoadModelRequest>) -> ApiResult<Json<LoadModelResponse>> {
    let source = if let Some(remote) = request.remote {
        FamilySource::Remote {
            config: RemoteEngineConfig {
                base_url: remote.base_url,
                api_key: remote.api_key,
                capabilities: remote.capabilities,
            },
        }
    } else {
        let default = state.registry.get_default(&request.model);
        let version = request
            .version
            .clone()
            .or_else(|| default.as_ref().map(|d| d.version.clone()))
            .ok_or_else(|| cortex_core::Error::bad_request("version is required when no default variant is set"))?;
        let variant = request
            .variant
            .clone()
            .or_else(|| default.as_ref().map(|d| d.variant.clone()))
            .ok_or_else(|| cortex_core::Error::bad_request("variant is required when no default variant is set"))?;
        // §6: ENGINE_PATH overrides the canonical install root the
        // `<family>/<variant>/<version>/` layout resolves beneath.
        let data_root = cortex_config::env_vars::env_string(cortex_config::env_vars::ENGINE_PATH)
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| state.config.get().data_folder);
        let install_dir = cortex_registry::layout::install_dir(&data_root, &request.model, &variant, &version);
        FamilySource::Local { install_dir }
    };

    state.loader.load(&request.model, source).await?;
    state.family_prompts.insert(
        request.model.clone(),
        FamilyPromptConfig {
            multimodal: request.multimodal,
            preprompt: request.preprompt,
            user_turn_marker: request.user_turn_marker,
        },
    );
    state.events.publish(cortex_events::Event::EngineLoaded {
        family: request.model.clone(),
        variant: request.variant.clone().unwrap_or_default(),
    });

    Ok(Json(LoadModelResponse { model: request.model, loaded: true }))
}

#[derive(Debug, Deserialize)]
struct UnloadModelRequest {
    model: String,
}

#[derive(Debug, Serialize)]
struct UnloadModelResponse {
    model: String,
    loaded: bool,
}

async fn unload_model(State(state): State<AppState>, Json(request): Json<UnloadModelRequest>) -> ApiResult<Json<UnloadModelResponse>> {
    state.loader.unload(&request.model).await?;
    state.family_prompts.remove(&request.model);
    state.events.publish(cortex_events::Event::EngineUnloaded { family: request.model.clone() });
    Ok(Json(UnloadModelResponse { model: request.model, loaded: false }))
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    data: Vec<String>,
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse { data: state.loader.loaded_families() })
}
