//! Error types for the engine and its collaborators.

use std::path::PathBuf;

use thiserror::Error;
use thought_canvas_core::{NodeId, StoreError};
use thought_canvas_layout::LayoutError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by [`LayoutEngine`](crate::LayoutEngine) and
/// [`ExplorationSession`](crate::ExplorationSession).
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node referenced by id is not in the store.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// An exploration was started with a blank topic.
    #[error("topic must not be empty")]
    EmptyTopic,

    /// The store rejected a mutation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Layout strategy could not be built.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Configuration was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The session's animation task is gone.
    #[error("session stopped")]
    Stopped,
}

/// Failures of the topic expansion service. Always recovered locally by the
/// engine, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No credential is available for a service that needs one.
    #[error("no credential available for the topic service")]
    MissingCredential,
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ServiceError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => ServiceError::MalformedResponse(err.to_string()),
            None => ServiceError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::MalformedResponse(err.to_string())
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unable to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<LayoutError> for ConfigError {
    fn from(err: LayoutError) -> Self {
        match err {
            LayoutError::InvalidConfig(msg) => ConfigError::Invalid(msg),
        }
    }
}
