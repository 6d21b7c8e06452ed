//! Library error taxonomy.
//!
//! Configuration errors are detected while setting up a parse and are attached
//! to the detailed result. Parse/validation errors and callback errors surface
//! at runtime through the program's failure routing and reach the caller of
//! `parse` as `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Contradictory declarations, e.g. a key that is both a count and an array.
    #[error("{0}")]
    Configuration(String),

    /// Token-level problems found while parsing (missing narg values, ...).
    #[error("{0}")]
    Parse(String),

    /// Structural validation failures: required, unknown, choices, implies, conflicts.
    #[error("{0}")]
    Validation(String),

    #[error("Not enough non-option arguments: got {got}, need at least {need}")]
    NotEnoughArguments { got: usize, need: usize },

    /// A coerce callback failed for `key`.
    #[error("{source}")]
    Coerce {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other user callback failure (builder, middleware, handler).
    #[error(transparent)]
    Callback(#[from] anyhow::Error),

    #[error(".parse_sync() must not be used with asynchronous builders, handlers, or middleware")]
    AsyncInSyncParse,

    /// API misuse, e.g. an empty command string.
    #[error("{0}")]
    Usage(String),

    #[error("invalid YAML manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn coerce(key: impl Into<String>, source: anyhow::Error) -> Self {
        Error::Coerce {
            key: key.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
