//! Root repository.

use crate::error::MetadataResult;
use crate::models::{RootPinCounts, RootRow};
use async_trait::async_trait;
use stockpile_core::{RootMeta, RootStatus};
use uuid::Uuid;

/// Repository for named roots and their pin associations.
#[async_trait]
pub trait RootRepo: Send + Sync {
    /// Create a root with status Pending.
    async fn create_root(&self, meta: &RootMeta) -> MetadataResult<Uuid>;

    async fn get_root(&self, root_id: Uuid) -> MetadataResult<Option<RootRow>>;

    async fn list_roots(&self) -> MetadataResult<Vec<RootRow>>;

    /// Associate NARs with a root. Monotonic: repeat calls add pins,
    /// never remove them. Unknown root fails with `NotFound`.
    async fn pin_root_nars(&self, root_id: Uuid, nar_ids: &[i64]) -> MetadataResult<()>;

    /// The NAR ids pinned by one root.
    async fn root_pins(&self, root_id: Uuid) -> MetadataResult<Vec<i64>>;

    /// Roots that pin the given NAR, for event-driven status recompute.
    async fn roots_pinning(&self, nar_id: i64) -> MetadataResult<Vec<Uuid>>;

    /// Pin status summary feeding `recompute_status`.
    async fn root_pin_status_counts(&self, root_id: Uuid) -> MetadataResult<RootPinCounts>;

    async fn set_root_status(&self, root_id: Uuid, status: RootStatus) -> MetadataResult<()>;

    /// Unregister the root and drop its pins. The pinned NARs themselves
    /// are untouched; reclaiming them is the garbage collector's job.
    async fn release_root(&self, root_id: Uuid) -> MetadataResult<()>;
}
