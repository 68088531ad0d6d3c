//! Global NAR table repository.

use crate::error::MetadataResult;
use crate::models::{IntegrityCheck, NarRow};
use async_trait::async_trait;
use stockpile_core::{NarMeta, NarStatus};

/// Repository for the global NAR table and its availability state machine.
#[async_trait]
pub trait NarRepo: Send + Sync {
    /// Register a NAR, idempotent on hash.
    ///
    /// An existing non-Trashed row wins: its id is returned and the
    /// supplied metadata is ignored. A Trashed row is resurrected to
    /// Pending with the new metadata.
    async fn register_nar(&self, hash: &str, name: &str, meta: &NarMeta) -> MetadataResult<i64>;

    /// Transition a NAR Pending -> Available after its blob was verified.
    ///
    /// Fails with `IntegrityMismatch` when the observed hashes or sizes
    /// disagree with the registered row, and with `InvalidTransition`
    /// when the row is Trashed. Idempotent on an Available row.
    async fn mark_nar_available(&self, id: i64, check: &IntegrityCheck) -> MetadataResult<()>;

    /// Look up by id.
    async fn get_nar(&self, id: i64) -> MetadataResult<Option<NarRow>>;

    /// Look up by hash.
    async fn get_nar_by_hash(&self, hash: &str) -> MetadataResult<Option<NarRow>>;

    /// All rows currently in the given status.
    async fn list_nars_by_status(&self, status: NarStatus) -> MetadataResult<Vec<NarRow>>;
}
