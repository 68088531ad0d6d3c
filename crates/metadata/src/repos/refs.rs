//! Global reference-edge repository.

use crate::error::MetadataResult;
use async_trait::async_trait;

/// Repository for the directed edge set `nar -> reference`.
///
/// Edges form a set (duplicates are ignored). Self-edges are recorded but
/// never contribute to reachability; closure computation over a snapshot
/// lives in the engine.
#[async_trait]
pub trait ReferenceRepo: Send + Sync {
    /// Record that `nar_id` depends on `ref_id`. No-op if present.
    async fn add_nar_ref(&self, nar_id: i64, ref_id: i64) -> MetadataResult<()>;

    /// Point-in-time snapshot of every edge, self-edges included.
    async fn nar_refs_snapshot(&self) -> MetadataResult<Vec<(i64, i64)>>;

    /// Outgoing references of one NAR, self-edge excluded.
    async fn references_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>>;

    /// Incoming referrers of one NAR, self-edge excluded.
    async fn referrers_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>>;
}
