//! `/v1/threads`: thread create/list/get/patch/delete. Message-level
//! operations stay crate-internal to `cortex-threads` — this surface does
//! not expose them over HTTP.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;
use cortex_threads::{Metadata, SortOrder, Thread};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/threads", get(list_threads).post(create_thread))
        .route("/v1/threads/:id", get(get_thread).patch(patch_thread).delete(delete_thread))
}

#[derive(Debug, Deserialize)]
struct ListThreadsQuery {
    #[serde(default = "default_limit")]
    limit: u8,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    before: Option<String>,
}

fn default_limit() -> u8 {
    20
}

async fn list_threads(State(state): State<AppState>, Query(query): Query<ListThreadsQuery>) -> ApiResult<Json<Vec<Thread>>> {
    let order = match query.order.as_deref() {
        Some("desc") => SortOrder::Desc,
        _ => SortOrder::Asc,
    };
    let threads = state.threads.list(query.limit, order, query.after.as_deref(), query.before.as_deref()).await?;
    Ok(Json(threads))
}

#[derive(Debug, Deserialize)]
struct CreateThreadRequest {
    #[serde(default)]
    metadata: Metadata,
}

async fn create_thread(State(state): State<AppState>, Json(request): Json<CreateThreadRequest>) -> ApiResult<Json<Thread>> {
    let thread = state.threads.create(request.metadata).await?;
    Ok(Json(thread))
}

async fn get_thread(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Thread>> {
    let thread = state.threads.retrieve(&id).await?;
    Ok(Json(thread))
}

#[derive(Debug, Deserialize)]
struct PatchThreadRequest {
    metadata: Metadata,
}

async fn patch_thread(State(state): State<AppState>, Path(id): Path<String>, Json(request): Json<PatchThreadRequest>) -> ApiResult<Json<Thread>> {
    let thread = state.threads.modify(&id, request.metadata).await?;
    Ok(Json(thread))
}

async fn delete_thread(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<serde_json::Value>> {
    state.threads.delete(&id).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}
