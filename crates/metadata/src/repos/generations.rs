//! Generation repository.

use crate::error::MetadataResult;
use crate::models::{GenerationRootRow, GenerationRow, NarInfoRow};
use async_trait::async_trait;
use stockpile_core::{GenerationExtraInfo, GenerationStatus, NarInfo};

/// Repository for generation snapshots and their scoped nar-info views.
#[async_trait]
pub trait GenerationRepo: Send + Sync {
    /// Create a generation with status Pending. Ids are monotonically
    /// increasing.
    async fn create_generation(
        &self,
        cache_url: &str,
        extra: &GenerationExtraInfo,
    ) -> MetadataResult<i64>;

    async fn get_generation(&self, id: i64) -> MetadataResult<Option<GenerationRow>>;

    async fn list_generations(&self) -> MetadataResult<Vec<GenerationRow>>;

    /// Advance the generation state machine to Indexing, Downloading or
    /// Canceled. Transitions are validated against
    /// `GenerationStatus::can_transition_to`; entering Indexing fails
    /// with `AlreadyActive` when another generation for the same
    /// cache_url is already Indexing or Downloading. Finished is only
    /// reachable through `finish_generation`.
    async fn set_generation_status(&self, id: i64, to: GenerationStatus) -> MetadataResult<()>;

    /// Record a logical root entry of the snapshot's closure; its
    /// nar-info link starts unresolved.
    async fn add_generation_root(&self, generation_id: i64, hash: &str, name: &str)
        -> MetadataResult<()>;

    async fn generation_roots(&self, generation_id: i64)
        -> MetadataResult<Vec<GenerationRootRow>>;

    /// Upsert a nar-info row keyed on (generation, hash) and resolve any
    /// matching generation-root link. Returns the row id. Availability of
    /// an existing row is preserved.
    async fn upsert_nar_info(&self, generation_id: i64, info: &NarInfo) -> MetadataResult<i64>;

    async fn get_nar_info(
        &self,
        generation_id: i64,
        hash: &str,
    ) -> MetadataResult<Option<NarInfoRow>>;

    /// Flip one nar-info row to available.
    async fn set_nar_info_available(&self, generation_id: i64, hash: &str) -> MetadataResult<()>;

    /// Record a generation-scoped reference edge between nar-info rows.
    async fn add_nar_info_ref(
        &self,
        generation_id: i64,
        from_info_id: i64,
        to_info_id: i64,
    ) -> MetadataResult<()>;

    /// Hashes of every nar-info row in this generation's view.
    async fn nar_info_hashes(&self, generation_id: i64) -> MetadataResult<Vec<String>>;

    /// Hashes of this generation's nar-info rows still unavailable.
    async fn unavailable_nar_infos(&self, generation_id: i64) -> MetadataResult<Vec<String>>;

    /// Downloading generations whose view contains the given hash, for
    /// event-driven completion checks.
    async fn downloading_generations_with_hash(&self, hash: &str) -> MetadataResult<Vec<i64>>;

    /// Atomically finish a Downloading generation: fails with
    /// `Incomplete` unless every nar-info row is available; otherwise
    /// sets Finished, stamps end_time, and aggregates totals.
    async fn finish_generation(&self, id: i64) -> MetadataResult<GenerationRow>;

    /// Cancel from any non-terminal state. Terminal; end_time stays NULL.
    async fn cancel_generation(&self, id: i64) -> MetadataResult<()>;

    /// Retire a Finished generation so it stops anchoring GC liveness.
    /// An owner decision, never automatic; the rows remain queryable.
    async fn retire_generation(&self, id: i64) -> MetadataResult<()>;
}
