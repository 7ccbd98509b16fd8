//! Error types for UA Switch

use thiserror::Error;

/// Result type alias for UA Switch operations
pub type UaResult<T> = Result<T, UaError>;

/// Main error type for UA Switch
#[derive(Error, Debug)]
pub enum UaError {
    /// Persistence layer rejected a read, write or clear
    #[error("Storage error: {0}")]
    Storage(String),

    /// Host rule engine rejected a remove or add call
    #[error("Rule apply error: {0}")]
    RuleApply(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid import file format: {0}")]
    ImportFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UaError {
    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new rule apply error
    pub fn rule_apply(msg: impl Into<String>) -> Self {
        Self::RuleApply(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new import format error
    pub fn import_format(msg: impl Into<String>) -> Self {
        Self::ImportFormat(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
