//! Crate-wide error taxonomy shared by every Cortex component.
//!
//! Mirrors the error kind table from the system spec: each variant carries
//! enough context to render both an HTTP status and a human message, without
//! forcing callers to downcast.

use serde::Serialize;
use std::fmt;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category a [`Error`] falls into. Kept separate from `Error`
/// itself so HTTP adapters and the event bus can match on it without caring
/// about the specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    BadRequest,
    IncompatibleHost,
    LoadFailed,
    EngineBusy,
    EngineError,
    DownloadFailed,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::IncompatibleHost => "incompatible_host",
            ErrorKind::LoadFailed => "load_failed",
            ErrorKind::EngineBusy => "engine_busy",
            ErrorKind::EngineError => "engine_error",
            ErrorKind::DownloadFailed => "download_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A typed, user-presentable error. All fallible Cortex operations return
/// `Result<T, Error>` rather than panicking.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn incompatible_host(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleHost, message)
    }

    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoadFailed, message)
    }

    pub fn engine_busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineBusy, message)
    }

    pub fn engine_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineError, message)
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DownloadFailed, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// JSON envelope shape for non-streaming HTTP failures: `{"message", "kind"}`.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            message: self.message.clone(),
            kind: self.kind,
        }
    }
}

/// Wire shape for a non-streaming HTTP error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub kind: ErrorKind,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Internal, err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::with_source(ErrorKind::BadRequest, err.to_string(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_kind() {
        let err = Error::not_found("engine llama-cpp not installed");
        let env = err.to_envelope();
        assert_eq!(env.kind, ErrorKind::NotFound);
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"kind\":\"not_found\""));
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::engine_busy("family llama-cpp occupied");
        assert_eq!(err.to_string(), "engine_busy: family llama-cpp occupied");
    }
}
