//! Error types for mgt-genre
//!
//! Only configuration-class errors escape the engine, and only at startup.
//! Provider failures are data (`types::ProviderFailure`), never errors.

use thiserror::Error;

/// Engine error type
#[derive(Debug, Error)]
pub enum GenreError {
    /// Invalid or missing configuration (unknown keys, bad weights, missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed taxonomy data (duplicate alias, cycle, unknown parent, too deep)
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    /// Cache store failure (non-fatal inside a resolution)
    #[error("Cache error: {0}")]
    Cache(String),

    /// SQLite cache store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cached value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// mgt-common error
    #[error(transparent)]
    Common(#[from] mgt_common::Error),
}

impl GenreError {
    /// True for errors that must abort startup
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GenreError::Config(_) | GenreError::Taxonomy(_) | GenreError::Common(_)
        )
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, GenreError>;
