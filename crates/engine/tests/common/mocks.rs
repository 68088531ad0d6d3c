//! Mock upstream implementations.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockpile_core::{
    GenerationExtraInfo, GenerationStatus, NarInfo, NarMeta, NarStatus, RootMeta, RootStatus,
};
use stockpile_engine::{EngineError, EngineResult, NarFetcher, PathIndexer};
use stockpile_metadata::models::{
    GenerationRootRow, GenerationRow, IntegrityCheck, NarInfoRow, NarRow, RootPinCounts, RootRow,
};
use stockpile_metadata::{
    GcRepo, GenerationRepo, MetadataError, MetadataResult, MetadataStore, NarRepo, ReferenceRepo,
    RootRepo, SqliteStore,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Serves narinfo documents from a fixed in-memory set.
pub struct MockIndexer {
    infos: HashMap<String, NarInfo>,
}

impl MockIndexer {
    pub fn new(infos: impl IntoIterator<Item = NarInfo>) -> Self {
        Self {
            infos: infos
                .into_iter()
                .map(|info| (info.store_path.hash().as_str().to_string(), info))
                .collect(),
        }
    }
}

#[async_trait]
impl PathIndexer for MockIndexer {
    async fn nar_info(&self, hash: &str) -> EngineResult<Option<NarInfo>> {
        Ok(self.infos.get(hash).cloned())
    }
}

/// Fetcher that echoes back the registered integrity values, with
/// optional per-hash failures and an artificial transfer delay.
#[derive(Default)]
pub struct MockFetcher {
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make every fetch of this hash fail until cleared.
    pub fn fail_hash(&self, hash: &str) {
        self.failing.lock().unwrap().insert(hash.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Number of transfers actually started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NarFetcher for MockFetcher {
    async fn fetch(
        &self,
        nar: &NarRow,
        cancel: &CancellationToken,
    ) -> EngineResult<IntegrityCheck> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }
        if self.failing.lock().unwrap().contains(&nar.hash) {
            return Err(EngineError::Fetch {
                hash: nar.hash.clone(),
                reason: "upstream returned 500".to_string(),
            });
        }
        Ok(IntegrityCheck {
            file_hash: nar.file_hash.clone(),
            file_size: nar.file_size.map(|s| s as u64),
            nar_hash: nar.nar_hash.clone(),
            nar_size: nar.nar_size as u64,
        })
    }
}

/// Store decorator that can fail the root lookup driving availability
/// propagation while delegating everything else to a real store.
pub struct FaultyStore {
    inner: Arc<SqliteStore>,
    fail_roots_lookup: AtomicBool,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_roots_lookup: AtomicBool::new(false),
        }
    }

    /// Make `roots_pinning` fail until turned off again.
    pub fn fail_roots_lookup(&self, fail: bool) {
        self.fail_roots_lookup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NarRepo for FaultyStore {
    async fn register_nar(&self, hash: &str, name: &str, meta: &NarMeta) -> MetadataResult<i64> {
        self.inner.register_nar(hash, name, meta).await
    }

    async fn mark_nar_available(&self, id: i64, check: &IntegrityCheck) -> MetadataResult<()> {
        self.inner.mark_nar_available(id, check).await
    }

    async fn get_nar(&self, id: i64) -> MetadataResult<Option<NarRow>> {
        self.inner.get_nar(id).await
    }

    async fn get_nar_by_hash(&self, hash: &str) -> MetadataResult<Option<NarRow>> {
        self.inner.get_nar_by_hash(hash).await
    }

    async fn list_nars_by_status(&self, status: NarStatus) -> MetadataResult<Vec<NarRow>> {
        self.inner.list_nars_by_status(status).await
    }
}

#[async_trait]
impl ReferenceRepo for FaultyStore {
    async fn add_nar_ref(&self, nar_id: i64, ref_id: i64) -> MetadataResult<()> {
        self.inner.add_nar_ref(nar_id, ref_id).await
    }

    async fn nar_refs_snapshot(&self) -> MetadataResult<Vec<(i64, i64)>> {
        self.inner.nar_refs_snapshot().await
    }

    async fn references_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>> {
        self.inner.references_of(nar_id).await
    }

    async fn referrers_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>> {
        self.inner.referrers_of(nar_id).await
    }
}

#[async_trait]
impl RootRepo for FaultyStore {
    async fn create_root(&self, meta: &RootMeta) -> MetadataResult<Uuid> {
        self.inner.create_root(meta).await
    }

    async fn get_root(&self, root_id: Uuid) -> MetadataResult<Option<RootRow>> {
        self.inner.get_root(root_id).await
    }

    async fn list_roots(&self) -> MetadataResult<Vec<RootRow>> {
        self.inner.list_roots().await
    }

    async fn pin_root_nars(&self, root_id: Uuid, nar_ids: &[i64]) -> MetadataResult<()> {
        self.inner.pin_root_nars(root_id, nar_ids).await
    }

    async fn root_pins(&self, root_id: Uuid) -> MetadataResult<Vec<i64>> {
        self.inner.root_pins(root_id).await
    }

    async fn roots_pinning(&self, nar_id: i64) -> MetadataResult<Vec<Uuid>> {
        if self.fail_roots_lookup.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal("root lookup unavailable".to_string()));
        }
        self.inner.roots_pinning(nar_id).await
    }

    async fn root_pin_status_counts(&self, root_id: Uuid) -> MetadataResult<RootPinCounts> {
        self.inner.root_pin_status_counts(root_id).await
    }

    async fn set_root_status(&self, root_id: Uuid, status: RootStatus) -> MetadataResult<()> {
        self.inner.set_root_status(root_id, status).await
    }

    async fn release_root(&self, root_id: Uuid) -> MetadataResult<()> {
        self.inner.release_root(root_id).await
    }
}

#[async_trait]
impl GenerationRepo for FaultyStore {
    async fn create_generation(
        &self,
        cache_url: &str,
        extra: &GenerationExtraInfo,
    ) -> MetadataResult<i64> {
        self.inner.create_generation(cache_url, extra).await
    }

    async fn get_generation(&self, id: i64) -> MetadataResult<Option<GenerationRow>> {
        self.inner.get_generation(id).await
    }

    async fn list_generations(&self) -> MetadataResult<Vec<GenerationRow>> {
        self.inner.list_generations().await
    }

    async fn set_generation_status(&self, id: i64, to: GenerationStatus) -> MetadataResult<()> {
        self.inner.set_generation_status(id, to).await
    }

    async fn add_generation_root(
        &self,
        generation_id: i64,
        hash: &str,
        name: &str,
    ) -> MetadataResult<()> {
        self.inner.add_generation_root(generation_id, hash, name).await
    }

    async fn generation_roots(
        &self,
        generation_id: i64,
    ) -> MetadataResult<Vec<GenerationRootRow>> {
        self.inner.generation_roots(generation_id).await
    }

    async fn upsert_nar_info(&self, generation_id: i64, info: &NarInfo) -> MetadataResult<i64> {
        self.inner.upsert_nar_info(generation_id, info).await
    }

    async fn get_nar_info(
        &self,
        generation_id: i64,
        hash: &str,
    ) -> MetadataResult<Option<NarInfoRow>> {
        self.inner.get_nar_info(generation_id, hash).await
    }

    async fn set_nar_info_available(&self, generation_id: i64, hash: &str) -> MetadataResult<()> {
        self.inner.set_nar_info_available(generation_id, hash).await
    }

    async fn add_nar_info_ref(
        &self,
        generation_id: i64,
        from_info_id: i64,
        to_info_id: i64,
    ) -> MetadataResult<()> {
        self.inner
            .add_nar_info_ref(generation_id, from_info_id, to_info_id)
            .await
    }

    async fn nar_info_hashes(&self, generation_id: i64) -> MetadataResult<Vec<String>> {
        self.inner.nar_info_hashes(generation_id).await
    }

    async fn unavailable_nar_infos(&self, generation_id: i64) -> MetadataResult<Vec<String>> {
        self.inner.unavailable_nar_infos(generation_id).await
    }

    async fn downloading_generations_with_hash(&self, hash: &str) -> MetadataResult<Vec<i64>> {
        self.inner.downloading_generations_with_hash(hash).await
    }

    async fn finish_generation(&self, id: i64) -> MetadataResult<GenerationRow> {
        self.inner.finish_generation(id).await
    }

    async fn cancel_generation(&self, id: i64) -> MetadataResult<()> {
        self.inner.cancel_generation(id).await
    }

    async fn retire_generation(&self, id: i64) -> MetadataResult<()> {
        self.inner.retire_generation(id).await
    }
}

#[async_trait]
impl GcRepo for FaultyStore {
    async fn live_frontier(&self) -> MetadataResult<Vec<i64>> {
        self.inner.live_frontier().await
    }

    async fn collectable_nar_ids(&self) -> MetadataResult<Vec<i64>> {
        self.inner.collectable_nar_ids().await
    }

    async fn trash_unreachable(&self, nar_ids: &[i64]) -> MetadataResult<u64> {
        self.inner.trash_unreachable(nar_ids).await
    }

    async fn purge_trashed(&self) -> MetadataResult<u64> {
        self.inner.purge_trashed().await
    }
}

#[async_trait]
impl MetadataStore for FaultyStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
