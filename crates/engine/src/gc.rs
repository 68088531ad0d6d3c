//! Mark-and-sweep garbage collection over the global reference graph.

use crate::error::EngineResult;
use crate::graph::ReferenceGraph;
use std::collections::HashSet;
use std::sync::Arc;
use stockpile_metadata::MetadataStore;

/// Counters for one collection pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Non-Trashed NARs examined.
    pub examined: usize,
    /// Size of the live closure.
    pub live: usize,
    /// NARs moved to Trashed this pass.
    pub trashed: u64,
}

pub struct GarbageCollector<S> {
    store: Arc<S>,
}

impl<S: MetadataStore> GarbageCollector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// One mark-and-sweep pass.
    ///
    /// Mark: the live closure is computed in memory from the frontier
    /// (root pins plus members of Finished non-retired generations)
    /// over an edge snapshot. Sweep: everything else, minus `in_flight`
    /// fetches, is trashed in a single transaction that re-validates
    /// liveness at delete time. A pass over an unchanged store trashes
    /// nothing.
    pub async fn run(&self, in_flight: &HashSet<i64>) -> EngineResult<GcStats> {
        let frontier = self.store.live_frontier().await?;
        let edges = self.store.nar_refs_snapshot().await?;
        let live = ReferenceGraph::from_edges(edges).closure_of(frontier);

        let examined = self.store.collectable_nar_ids().await?;
        let candidates: Vec<i64> = examined
            .iter()
            .copied()
            .filter(|id| !live.contains(id) && !in_flight.contains(id))
            .collect();

        let stats = GcStats {
            examined: examined.len(),
            live: live.len(),
            trashed: self.store.trash_unreachable(&candidates).await?,
        };
        tracing::info!(
            examined = stats.examined,
            live = stats.live,
            trashed = stats.trashed,
            "gc pass complete"
        );
        Ok(stats)
    }

    /// Physically delete Trashed rows nothing points to anymore.
    pub async fn purge(&self) -> EngineResult<u64> {
        Ok(self.store.purge_trashed().await?)
    }
}
