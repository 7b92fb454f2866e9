//! `POST /v1/chat/completions` and `POST /v1/embeddings`: the OpenAI-shaped
//! inference surface, thin over [`cortex_dispatch::Dispatcher`].
//!
//! Streaming mirrors `dashflow-langserve`'s `stream_handler` shape (an
//! `async_stream::stream!` block feeding an `axum::response::sse::Sse`), but
//! emits raw `data:` frames rather than named SSE events, and appends the
//! `data: [DONE]` sentinel the dispatcher's stream itself does not know
//! about — that convention belongs to the wire protocol, not to dispatch.

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use futures::StreamExt;
use std::convert::Infallible;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use cortex_dispatch::{ChatCompletionRequest, EmbeddingsRequest};

pub async fn chat_completions(State(state): State<AppState>, Json(request): Json<ChatCompletionRequest>) -> ApiResult<axum::response::Response> {
    let family = request.model.clone();
    let family_config = state.family_prompt(&family);

    if request.stream.unwrap_or(false) {
        let stream = state.dispatcher.chat_completion_stream(&family, &family_config, request).await?;
        let sse_stream = stream.map(|chunk| -> Result<Event, Infallible> {
            match chunk {
                Ok(chunk) => Ok(Event::default().json_data(chunk).unwrap_or_else(|_| Event::default().data("{}"))),
                Err(err) => Ok(Event::default().json_data(err.to_envelope()).unwrap_or_else(|_| Event::default().data("{}"))),
            }
        });
        let done = futures::stream::once(async { Ok(Event::default().data("[DONE]")) });
        let combined = sse_stream.chain(done);
        Ok(Sse::new(combined).keep_alive(KeepAlive::default()).into_response())
    } else {
        let response = state.dispatcher.chat_completion(&family, &family_config, request).await.map_err(ApiError::from)?;
        Ok(Json(response).into_response())
    }
}

pub async fn embeddings(State(state): State<AppState>, Json(request): Json<EmbeddingsRequest>) -> ApiResult<Json<cortex_dispatch::EmbeddingsResponse>> {
    let family = request.model.clone();
    let response = state.dispatcher.embeddings(&family, request).await?;
    Ok(Json(response))
}
