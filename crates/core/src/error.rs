//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid store path: {0}")]
    InvalidStorePath(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("narinfo parse error: {0}")]
    NarInfoParse(String),

    #[error("unknown status code: {0}")]
    InvalidStatus(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
