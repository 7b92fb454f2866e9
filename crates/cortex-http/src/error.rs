//! Maps [`cortex_core::Error`] onto the JSON error envelope and an HTTP
//! status, so every route handler can return `Result<T, ApiError>` and rely
//! on `?` rather than hand-building error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cortex_core::{Error, ErrorKind};

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::IncompatibleHost => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::LoadFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::EngineBusy => StatusCode::LOCKED,
        ErrorKind::EngineError => StatusCode::BAD_GATEWAY,
        ErrorKind::DownloadFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind);
        if status.is_server_error() {
            tracing::error!(kind = %self.0.kind, message = %self.0.message, "request failed");
        } else {
            tracing::debug!(kind = %self.0.kind, message = %self.0.message, "request rejected");
        }
        (status, Json(self.0.to_envelope())).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
