//! Error types for personagraph.
//!
//! Library crates use [`PersonaGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all personagraph operations.
#[derive(Debug, thiserror::Error)]
pub enum PersonaGraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to a hosted service.
    #[error("network error: {0}")]
    Network(String),

    /// Structured output or data file could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A hosted service answered with an error.
    #[error("{service} error: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    /// Workflow graph misconfiguration. Fatal for the run.
    #[error("graph error: {message}")]
    Graph { message: String },

    /// The caller handed in a query that cannot enter the graph.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PersonaGraphError>;

impl PersonaGraphError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a service error attributed to `service`.
    pub fn service(service: &'static str, msg: impl Into<String>) -> Self {
        Self::Service {
            service,
            message: msg.into(),
        }
    }

    /// Create a graph construction/traversal error.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph {
            message: msg.into(),
        }
    }

    /// Create an invalid-query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the run rather than degrade a stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Graph { .. } | Self::InvalidQuery { .. })
    }
}
