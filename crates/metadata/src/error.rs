//! Metadata store error types.

use thiserror::Error;

/// Format a hash list for display, capped to keep log lines bounded.
fn format_hashes(hashes: &[String]) -> String {
    const MAX_DISPLAYED: usize = 5;
    if hashes.len() <= MAX_DISPLAYED {
        format!("{hashes:?}")
    } else {
        let sample: Vec<_> = hashes.iter().take(MAX_DISPLAYED).collect();
        format!("{:?} (and {} more)", sample, hashes.len() - MAX_DISPLAYED)
    }
}

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("integrity mismatch for {hash}: {field} expected {expected}, got {actual}")]
    IntegrityMismatch {
        hash: String,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("nar {nar_id} is still referenced by {}", format_hashes(.referrers))]
    Referenced { nar_id: i64, referrers: Vec<String> },

    #[error("live reference to gc candidate {nar_id}, batch aborted")]
    LiveReferenceViolation { nar_id: i64 },

    #[error("generation {generation_id} has {} unavailable paths: {}", .missing.len(), format_hashes(.missing))]
    Incomplete {
        generation_id: i64,
        missing: Vec<String>,
    },

    #[error("another generation for {cache_url} is already indexing or downloading")]
    AlreadyActive { cache_url: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("metadata blob error: {0}")]
    Meta(#[from] serde_json::Error),

    #[error("invalid domain value: {0}")]
    Domain(#[from] stockpile_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
