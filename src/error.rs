//! Error types for the cache orchestration layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache orchestration layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Malformed or incomplete configuration; fatal at load time.
    ///
    /// `path` is the dotted location of the offending field,
    /// e.g. `groups.user.prefix`.
    #[error("Invalid configuration at '{path}': {message}")]
    Config {
        /// Dotted path to the offending configuration field
        path: String,
        /// Description of what is wrong
        message: String,
    },

    /// Unknown `group.key` template name
    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    /// Template placeholder without a supplied parameter
    #[error("Missing template parameter: {0}")]
    MissingParameter(String),

    /// Backend driver I/O failure
    #[error("Driver error: {0}")]
    Driver(String),

    /// Value (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Caller-supplied producer failed; the original error is preserved
    #[error("Producer error: {0}")]
    Producer(#[source] anyhow::Error),
}

impl CacheError {
    /// Builds a `Config` error for a dotted field path.
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Config {
            path: path.into(),
            message: message.into(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache orchestration layer.
pub type Result<T> = std::result::Result<T, CacheError>;
