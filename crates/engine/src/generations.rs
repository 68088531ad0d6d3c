//! Generation snapshot lifecycle.
//!
//! A generation captures one point-in-time closure of an upstream
//! cache. Indexing walks narinfo documents breadth-first from the
//! logical roots, registers every discovered path globally, and
//! records both the global and the generation-scoped reference edges.

use crate::error::{EngineError, EngineResult};
use crate::upstream::PathIndexer;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use stockpile_core::{GenerationExtraInfo, GenerationStatus, NarInfo, StorePath};
use stockpile_metadata::models::GenerationRow;
use stockpile_metadata::{MetadataError, MetadataStore};
use tokio_util::sync::CancellationToken;

/// Summary of a completed indexing pass.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    /// Number of distinct store paths in the closure.
    pub total_paths: usize,
    /// Global NAR ids of the closure, for pinning and download driving.
    pub nar_ids: Vec<i64>,
}

/// Drives generations through their state machine.
pub struct GenerationManager<S, I> {
    store: Arc<S>,
    indexer: Arc<I>,
}

impl<S: MetadataStore, I: PathIndexer> GenerationManager<S, I> {
    pub fn new(store: Arc<S>, indexer: Arc<I>) -> Self {
        Self { store, indexer }
    }

    /// Create a generation for the upstream and claim the active slot.
    /// Fails with `AlreadyActive` while another generation for the same
    /// cache_url is still Indexing or Downloading.
    pub async fn begin(
        &self,
        cache_url: &str,
        extra: &GenerationExtraInfo,
    ) -> EngineResult<i64> {
        let id = self.store.create_generation(cache_url, extra).await?;
        self.store
            .set_generation_status(id, GenerationStatus::Indexing)
            .await?;
        Ok(id)
    }

    /// Index the closure of `root_paths` against the upstream cache.
    ///
    /// Discovery runs breadth-first over narinfo references. Paths are
    /// registered in two passes so every reference edge lands between
    /// rows that already exist. On success the generation moves to
    /// Downloading; any failure, cancellation included, moves it to
    /// Canceled so the upstream's active slot is released. A canceled
    /// generation is terminal; retrying means starting a new one.
    pub async fn index(
        &self,
        generation_id: i64,
        root_paths: &[StorePath],
        cancel: &CancellationToken,
    ) -> EngineResult<IndexOutcome> {
        match self.index_inner(generation_id, root_paths, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(cancel_err) = self.store.cancel_generation(generation_id).await {
                    tracing::warn!(
                        generation_id,
                        error = %cancel_err,
                        "could not cancel generation after indexing failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn index_inner(
        &self,
        generation_id: i64,
        root_paths: &[StorePath],
        cancel: &CancellationToken,
    ) -> EngineResult<IndexOutcome> {
        for path in root_paths {
            self.store
                .add_generation_root(generation_id, path.hash().as_str(), path.name())
                .await?;
        }

        let infos = self.discover_closure(root_paths, cancel).await?;

        // First pass: every path gets its global row and its
        // generation-scoped nar_info row.
        let mut ids: HashMap<String, (i64, i64)> = HashMap::new();
        for (hash, info) in &infos {
            let nar_id = self
                .store
                .register_nar(hash, info.store_path.name(), &info.meta)
                .await?;
            let info_id = self.store.upsert_nar_info(generation_id, info).await?;
            ids.insert(hash.clone(), (nar_id, info_id));
        }

        // Second pass: edges, now that both endpoints exist.
        for (hash, info) in &infos {
            let (from_nar, from_info) = ids[hash];
            for reference in info.reference_paths() {
                let reference = reference?;
                let ref_hash = reference.hash().as_str();
                if ref_hash == hash {
                    // Self-references are recorded globally and carry
                    // no liveness weight.
                    self.store.add_nar_ref(from_nar, from_nar).await?;
                    continue;
                }
                let (to_nar, to_info) =
                    ids.get(ref_hash)
                        .copied()
                        .ok_or_else(|| EngineError::Index {
                            hash: ref_hash.to_string(),
                            reason: "referenced path missing from closure".to_string(),
                        })?;
                self.store.add_nar_ref(from_nar, to_nar).await?;
                self.store
                    .add_nar_info_ref(generation_id, from_info, to_info)
                    .await?;
            }
        }

        self.store
            .set_generation_status(generation_id, GenerationStatus::Downloading)
            .await?;
        tracing::info!(generation_id, total_paths = infos.len(), "closure indexed");
        Ok(IndexOutcome {
            total_paths: infos.len(),
            nar_ids: infos.iter().map(|(hash, _)| ids[hash].0).collect(),
        })
    }

    /// Global NAR ids of every path in the generation's view.
    pub async fn closure_nar_ids(&self, generation_id: i64) -> EngineResult<Vec<i64>> {
        let mut out = Vec::new();
        for hash in self.store.nar_info_hashes(generation_id).await? {
            let nar = self
                .store
                .get_nar_by_hash(&hash)
                .await?
                .ok_or_else(|| EngineError::Metadata(MetadataError::NotFound(format!("nar {hash}"))))?;
            out.push(nar.id);
        }
        Ok(out)
    }

    pub async fn get(&self, generation_id: i64) -> EngineResult<Option<GenerationRow>> {
        Ok(self.store.get_generation(generation_id).await?)
    }

    /// Cancel a generation from any non-terminal state.
    pub async fn cancel(&self, generation_id: i64) -> EngineResult<()> {
        self.store.cancel_generation(generation_id).await?;
        Ok(())
    }

    /// Retire a Finished generation so it stops anchoring liveness.
    pub async fn retire(&self, generation_id: i64) -> EngineResult<()> {
        self.store.retire_generation(generation_id).await?;
        Ok(())
    }

    /// Breadth-first narinfo discovery from the roots. Ordered so
    /// registration is deterministic.
    async fn discover_closure(
        &self,
        root_paths: &[StorePath],
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<(String, NarInfo)>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<StorePath> = VecDeque::new();
        for path in root_paths {
            if seen.insert(path.hash().as_str().to_string()) {
                queue.push_back(path.clone());
            }
        }

        let mut infos: Vec<(String, NarInfo)> = Vec::new();
        while let Some(path) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(EngineError::Canceled);
            }
            let hash = path.hash().as_str().to_string();
            let info = self
                .indexer
                .nar_info(&hash)
                .await?
                .ok_or_else(|| EngineError::Index {
                    hash: hash.clone(),
                    reason: "upstream does not serve this path".to_string(),
                })?;
            for reference in info.reference_paths() {
                let reference = reference?;
                if seen.insert(reference.hash().as_str().to_string()) {
                    queue.push_back(reference);
                }
            }
            infos.push((hash, info));
        }
        Ok(infos)
    }
}
