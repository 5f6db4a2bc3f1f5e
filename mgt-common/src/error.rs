//! Common error types for MGT

use thiserror::Error;

/// Common result type for MGT operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MGT crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed TOML document
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
