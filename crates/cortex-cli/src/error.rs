//! Exit-code-carrying error type. Every command function returns
//! `CliResult<()>`; `main` maps the outcome to one of the three exit codes
//! the external interface promises: `0` success, `1` user error, `2`
//! runtime error.

use std::fmt;
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    User,
    Runtime,
}

#[derive(Debug)]
pub struct CliError {
    pub kind: ExitKind,
    pub message: String,
}

impl CliError {
    pub fn user(message: impl Into<String>) -> Self {
        Self { kind: ExitKind::User, message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self { kind: ExitKind::Runtime, message: message.into() }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind {
            ExitKind::User => ExitCode::from(1),
            ExitKind::Runtime => ExitCode::from(2),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

pub type CliResult<T> = Result<T, CliError>;

/// Server-side failures surface a `{"message", "kind"}` envelope; anything
/// reported that way is a runtime error from the CLI's point of view (the
/// HTTP status already separated user vs. server faults upstream).
impl From<cortex_core::ErrorEnvelope> for CliError {
    fn from(envelope: cortex_core::ErrorEnvelope) -> Self {
        CliError::runtime(format!("{}: {}", envelope.kind, envelope.message))
    }
}

impl From<reqwest::Error> for CliError {
    fn from(err: reqwest::Error) -> Self {
        CliError::runtime(format!("request to cortex-server failed: {err}"))
    }
}
