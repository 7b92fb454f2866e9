//! `/v1/engines` family/variant/release catalog and install/uninstall.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;
use cortex_core::{Error, HostDescriptor};
use cortex_entities::EngineEntry;
use cortex_registry::{Release, Variant};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/engines", get(list_engines))
        .route("/v1/engines/:family", get(get_engine).delete(delete_engine))
        .route("/v1/engines/:family/default", get(get_default).post(set_default))
        .route("/v1/engines/:family/releases", get(list_releases))
        .route("/v1/engines/:family/releases/:version", get(list_variants))
        .route("/v1/engines/:family/install", post(install_engine))
}

async fn list_engines(State(state): State<AppState>) -> ApiResult<Json<Vec<EngineEntry>>> {
    let engines = cortex_entities::engines::list(state.entities.engines())?;
    Ok(Json(engines))
}

async fn get_engine(State(state): State<AppState>, Path(family): Path<String>) -> ApiResult<Json<EngineEntry>> {
    let entry = cortex_entities::engines::list(state.entities.engines())?
        .into_iter()
        .find(|e| e.name == family)
        .ok_or_else(|| Error::not_found(format!("engine {family} not found")))?;
    Ok(Json(entry))
}

async fn delete_engine(State(state): State<AppState>, Path(family): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    let installed = state.registry.installed_variants(&family)?;
    for (variant, version) in installed {
        state.registry.uninstall(&family, &version, &variant)?;
    }
    Ok(Json(serde_json::json!({ "family": family, "deleted": true })))
}

#[derive(Debug, Serialize)]
struct DefaultVariantResponse {
    family: String,
    version: Option<String>,
    variant: Option<String>,
}

async fn get_default(State(state): State<AppState>, Path(family): Path<String>) -> Json<DefaultVariantResponse> {
    let default = state.registry.get_default(&family);
    Json(DefaultVariantResponse {
        family,
        version: default.as_ref().map(|d| d.version.clone()),
        variant: default.as_ref().map(|d| d.variant.clone()),
    })
}

#[derive(Debug, Deserialize)]
struct SetDefaultRequest {
    version: String,
    variant: String,
}

async fn set_default(State(state): State<AppState>, Path(family): Path<String>, Json(request): Json<SetDefaultRequest>) -> ApiResult<Json<DefaultVariantResponse>> {
    state.registry.set_default(&family, &request.version, &request.variant)?;
    Ok(Json(DefaultVariantResponse {
        family,
        version: Some(request.version),
        variant: Some(request.variant),
    }))
}

async fn list_releases(State(state): State<AppState>, Path(family): Path<String>) -> ApiResult<Json<Vec<Release>>> {
    let releases = state.registry.releases(&family).await?;
    Ok(Json(releases))
}

async fn list_variants(State(state): State<AppState>, Path((family, version)): Path<(String, String)>) -> ApiResult<Json<Vec<Variant>>> {
    let variants = state.registry.variants(&family, &version).await?;
    Ok(Json(variants))
}

#[derive(Debug, Deserialize, Default)]
struct InstallRequest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    variant: Option<String>,
}

async fn install_engine(State(state): State<AppState>, Path(family): Path<String>, body: axum::body::Bytes) -> ApiResult<Json<Variant>> {
    let request: InstallRequest = if body.is_empty() {
        InstallRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::bad_request(format!("invalid install request body: {e}")))?
    };
    let host = HostDescriptor::runtime_fallback();
    let variant = state
        .registry
        .install(&family, request.version.as_deref(), request.variant.as_deref(), &host)
        .await?;
    state.events.publish(cortex_events::Event::ModelInstalled {
        family,
        variant: variant.tag.clone(),
        file_name: variant.url.clone(),
    });
    Ok(Json(variant))
}
