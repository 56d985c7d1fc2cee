use std::path::PathBuf;

use reqwest::StatusCode;
use serde_json::{Map, Value};
use strum::Display;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the Beatoven.ai client
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Authentication error: {message}")]
    Auth { status: StatusCode, message: String },

    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Network failures and 5xx responses. Safe to retry the single call.
    #[error("Transient error: {message}")]
    Transient { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    /// The remote side answered with something we cannot interpret
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A batch job stopped before reporting an outcome
    #[error("Generation was cancelled: {message}")]
    Cancelled { message: String },

    #[error("Composition task {task_id} failed: {}", Value::Object(.meta.clone()))]
    TaskFailed {
        task_id: String,
        meta: Map<String, Value>,
    },
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Maps a non-success HTTP status to the error taxonomy.
    ///
    /// `not_found_distinct` decides whether a 404 is reported as `NotFound`
    /// (polling, downloads) or folded into `Validation` (composition).
    pub(crate) fn from_status(status: StatusCode, body: String, not_found_distinct: bool) -> Self {
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status} - {body}")
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth { status, message },
            StatusCode::NOT_FOUND if not_found_distinct => Self::NotFound { message },
            s if s.is_client_error() => Self::Validation { message },
            s if s.is_server_error() => Self::Transient { message },
            _ => Self::Protocol {
                message: format!("unexpected response status {message}"),
            },
        }
    }

    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                message: format!("{context}: {err}"),
            }
        } else if err.is_decode() {
            Self::Protocol {
                message: format!("{context}: {err}"),
            }
        } else {
            Self::Transient {
                message: format!("{context}: {err}"),
            }
        }
    }

    /// Whether repeating the failed call could succeed without changing anything
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// The workflow step an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Validating input before anything is sent
    Setup,
    Create,
    Poll,
    Download,
}

/// An [`Error`] annotated with the workflow phase it surfaced in.
///
/// The wrapped error is exposed as the error source and through [`Self::kind`].
#[derive(Debug, Error)]
#[error("{phase} phase failed")]
pub struct WorkflowError {
    pub phase: Phase,
    pub source: Error,
}

impl WorkflowError {
    pub fn new(phase: Phase, source: Error) -> Self {
        Self { phase, source }
    }

    pub fn kind(&self) -> &Error {
        &self.source
    }

    pub fn into_kind(self) -> Error {
        self.source
    }
}
