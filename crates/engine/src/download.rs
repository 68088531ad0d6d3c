//! NAR download pipeline.
//!
//! Fetches Pending NARs from the upstream, bounded by a global
//! concurrency limit, with per-NAR deduplication: a second request for
//! a NAR already being fetched attaches to the in-flight outcome
//! instead of starting another transfer. Successful fetches ripple
//! outwards: pinning roots recompute their status and Downloading
//! generations holding the hash flip their view row, finishing the
//! generation once nothing in its view is missing.

use crate::error::{EngineError, EngineResult};
use crate::roots::RootManager;
use crate::upstream::NarFetcher;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stockpile_core::NarStatus;
use stockpile_metadata::{MetadataError, MetadataStore};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio_util::sync::CancellationToken;

/// Upper bound on concurrent NAR transfers.
pub const MAX_CONCURRENT_FETCH: usize = 128;

/// Outcome published to attached waiters of an in-flight fetch.
type FetchOutcome = Option<Result<(), String>>;

/// Tally of one `fetch_many` pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadReport {
    pub fetched: usize,
    pub failed: usize,
}

pub struct Downloader<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    roots: RootManager<S>,
    semaphore: Arc<Semaphore>,
    in_flight: Mutex<HashMap<i64, watch::Receiver<FetchOutcome>>>,
}

impl<S: MetadataStore, F: NarFetcher> Downloader<S, F> {
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self {
            roots: RootManager::new(store.clone()),
            store,
            fetcher,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_FETCH)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// NAR ids with a fetch currently in flight, in the shape
    /// `GarbageCollector::run` takes as its exclusion set.
    pub async fn in_flight_ids(&self) -> HashSet<i64> {
        self.in_flight.lock().await.keys().copied().collect()
    }

    /// Fetch every NAR in the list, sharing in-flight transfers.
    /// Failures are tallied, not fatal; whatever succeeded stays.
    pub async fn fetch_many(
        &self,
        nar_ids: &[i64],
        cancel: &CancellationToken,
    ) -> DownloadReport {
        let results = futures::future::join_all(
            nar_ids.iter().map(|id| self.fetch_nar(*id, cancel)),
        )
        .await;

        let mut report = DownloadReport::default();
        for (id, result) in nar_ids.iter().zip(results) {
            match result {
                Ok(()) => report.fetched += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(nar_id = id, error = %e, "nar fetch failed");
                }
            }
        }
        report
    }

    /// Fetch one NAR, or attach to a fetch of it already in flight.
    pub async fn fetch_nar(&self, nar_id: i64, cancel: &CancellationToken) -> EngineResult<()> {
        let tx = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(rx) = in_flight.get(&nar_id) {
                let rx = rx.clone();
                drop(in_flight);
                return self.attach(nar_id, rx).await;
            }
            let (tx, rx) = watch::channel(None);
            in_flight.insert(nar_id, rx);
            tx
        };

        let result = self.fetch_inner(nar_id, cancel).await;
        self.in_flight.lock().await.remove(&nar_id);
        let _ = tx.send(Some(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(e.to_string()),
        }));
        result
    }

    /// Wait on another caller's in-flight fetch of the same NAR.
    async fn attach(
        &self,
        nar_id: i64,
        mut rx: watch::Receiver<FetchOutcome>,
    ) -> EngineResult<()> {
        loop {
            let outcome = rx.borrow().clone();
            match outcome {
                Some(Ok(())) => return Ok(()),
                Some(Err(reason)) => {
                    return Err(EngineError::Fetch {
                        hash: format!("id {nar_id}"),
                        reason,
                    });
                }
                None => {
                    if rx.changed().await.is_err() {
                        return Err(EngineError::Fetch {
                            hash: format!("id {nar_id}"),
                            reason: "in-flight fetch dropped".to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn fetch_inner(&self, nar_id: i64, cancel: &CancellationToken) -> EngineResult<()> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| EngineError::Canceled)?;

        let row = self
            .store
            .get_nar(nar_id)
            .await?
            .ok_or_else(|| EngineError::Metadata(MetadataError::NotFound(format!("nar id {nar_id}"))))?;
        match row.status()? {
            NarStatus::Available => return Ok(()),
            NarStatus::Trashed => {
                return Err(EngineError::Fetch {
                    hash: row.hash,
                    reason: "nar is trashed".to_string(),
                });
            }
            NarStatus::Pending => {}
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Canceled);
        }

        let check = self.fetcher.fetch(&row, cancel).await?;
        self.store.mark_nar_available(nar_id, &check).await?;
        tracing::debug!(nar_id, hash = %row.hash, "nar available");

        // The NAR is committed as Available at this point. A propagation
        // failure leaves roots or generations stale until the next
        // availability event, but the fetch itself succeeded.
        if let Err(e) = self.propagate_available(nar_id, &row.hash).await {
            tracing::warn!(nar_id, hash = %row.hash, error = %e, "availability propagation failed");
        }
        Ok(())
    }

    /// Ripple a fresh availability through roots and generations.
    async fn propagate_available(&self, nar_id: i64, hash: &str) -> EngineResult<()> {
        self.roots.on_nar_available(nar_id).await?;

        for generation_id in self.store.downloading_generations_with_hash(hash).await? {
            self.store.set_nar_info_available(generation_id, hash).await?;
            if self.store.unavailable_nar_infos(generation_id).await?.is_empty() {
                match self.store.finish_generation(generation_id).await {
                    Ok(row) => {
                        tracing::info!(
                            generation_id,
                            total_paths = row.total_paths,
                            "generation complete"
                        );
                    }
                    // Someone else finished it between the check and
                    // the transition.
                    Err(MetadataError::InvalidTransition { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}
