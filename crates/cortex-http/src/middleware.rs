//! Request-id, CORS, and bearer-auth middleware, layered in
//! `server::build_router` the way the teacher layers its own stack.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::state::AppState;
use cortex_core::ErrorEnvelope;

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Extracts `X-Request-Id` or generates one, stashing it in extensions and
/// echoing it back on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Mirrors the incoming `Origin` header back verbatim when it is allowed,
/// per the spec's CORS rule: "if enabled and origin is in the allow-list
/// (or the list contains `*`), mirror Origin; else omit."
///
/// This is the one deliberate divergence from the teacher's own
/// `cors_middleware`, which only ever mirrors the *first* configured origin
/// and explicitly refuses a wildcard fallback (its M-230 hardening note).
/// A local single-user control plane has no cross-origin attacker to harden
/// against, and the caller's own `Origin` is the one this surface is meant
/// to answer.
pub async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let allowed = state.config.get().cors_allowed_origins;
    let origin = request.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_string);

    let mirror = match (&origin, allowed.is_empty()) {
        (_, true) => None,
        (Some(origin), false) => {
            if allowed.iter().any(|o| o == "*" || o == origin) {
                Some(origin.clone())
            } else {
                None
            }
        }
        (None, false) => None,
    };

    let mut response = next.run(request).await;
    if let Some(origin) = mirror {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PATCH, DELETE, OPTIONS"),
        );
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization, X-Request-Id"),
        );
    }
    response
}

/// Placeholder seam for response-level error enhancement, mirroring the
/// teacher's own near-no-op `error_handler_middleware`. Error-to-envelope
/// conversion itself happens in `ApiError`'s `IntoResponse` impl, not here.
pub async fn error_handler_noop(request: Request, next: Next) -> Response {
    next.run(request).await
}

/// Bearer-token check against `Config::tokens`. An empty token list means
/// the surface is unauthenticated, per `cortex_config::Config::tokens`'s own
/// doc comment — this is a local control plane, not a multi-tenant one.
pub async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let tokens = state.config.get().tokens;
    if tokens.is_empty() {
        return next.run(request).await;
    }

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if tokens.iter().any(|t| t == token) => next.run(request).await,
        _ => {
            let envelope = ErrorEnvelope {
                message: "missing or invalid bearer token".to_string(),
                kind: cortex_core::ErrorKind::BadRequest,
            };
            (StatusCode::UNAUTHORIZED, Json(envelope)).into_response()
        }
    }
}
