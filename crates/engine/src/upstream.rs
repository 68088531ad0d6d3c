//! Upstream cache integration points.
//!
//! The engine is generic over how narinfo documents are discovered and
//! how NAR blobs land in local storage. Production wires HTTP clients
//! in here; tests wire mocks.

use crate::error::EngineResult;
use async_trait::async_trait;
use stockpile_core::NarInfo;
use stockpile_metadata::models::{IntegrityCheck, NarRow};
use tokio_util::sync::CancellationToken;

/// Narinfo discovery against an upstream binary cache.
#[async_trait]
pub trait PathIndexer: Send + Sync {
    /// Fetch the narinfo for a store path hash, or `None` when the
    /// upstream does not serve that path.
    async fn nar_info(&self, hash: &str) -> EngineResult<Option<NarInfo>>;
}

/// NAR blob transfer from an upstream cache into local storage.
#[async_trait]
pub trait NarFetcher: Send + Sync {
    /// Download and verify one NAR. Returns the integrity values
    /// observed on the wire; the store compares them against the
    /// registered row before flipping it to Available.
    async fn fetch(
        &self,
        nar: &NarRow,
        cancel: &CancellationToken,
    ) -> EngineResult<IntegrityCheck>;
}
