//! Garbage-collection repository: the liveness frontier and the atomic
//! batch operations the collector relies on.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for garbage-collection support operations.
#[async_trait]
pub trait GcRepo: Send + Sync {
    /// The liveness frontier: the union of every registered root's pin
    /// set and the global NAR ids appearing in any Finished, non-retired
    /// generation's nar-info view.
    async fn live_frontier(&self) -> MetadataResult<Vec<i64>>;

    /// Ids of every non-Trashed NAR, the candidate universe for GC.
    async fn collectable_nar_ids(&self) -> MetadataResult<Vec<i64>>;

    /// Trash an unreachable batch in one transaction.
    ///
    /// Before anything is modified, every candidate is re-validated:
    /// a non-self edge from outside the batch, a surviving root pin, or
    /// membership in a Finished non-retired generation aborts the whole
    /// batch with `LiveReferenceViolation`, leaving the store exactly as
    /// before. Otherwise all edges owned by batch members (self-edges
    /// included) are dropped and every member is marked Trashed. An
    /// edge surviving that cascade fails the restrict check with
    /// `Referenced`, also rolling back.
    async fn trash_unreachable(&self, nar_ids: &[i64]) -> MetadataResult<u64>;

    /// Physically delete Trashed rows that no surviving edge points to.
    /// Returns the number of rows removed.
    async fn purge_trashed(&self) -> MetadataResult<u64>;
}
