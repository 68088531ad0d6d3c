//! Engine error types.

use stockpile_metadata::MetadataError;
use thiserror::Error;

/// Errors produced while driving the mirror lifecycle.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("domain error: {0}")]
    Domain(#[from] stockpile_core::Error),

    #[error("indexing {hash} failed: {reason}")]
    Index { hash: String, reason: String },

    #[error("fetching nar {hash} failed: {reason}")]
    Fetch { hash: String, reason: String },

    #[error("operation canceled")]
    Canceled,
}

pub type EngineResult<T> = Result<T, EngineError>;
