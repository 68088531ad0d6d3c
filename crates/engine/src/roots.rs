//! Event-driven root status tracking.

use crate::error::{EngineError, EngineResult};
use std::sync::Arc;
use stockpile_core::{RootMeta, RootStatus};
use stockpile_metadata::models::RootPinCounts;
use stockpile_metadata::{MetadataError, MetadataStore};
use uuid::Uuid;

/// Manages named roots and keeps their status consistent with the
/// availability of their pinned NARs.
///
/// Status is a pure function of the pin counts and the previous status:
/// there is no polling loop, recomputation happens on registration, on
/// download start, and whenever a pinned NAR becomes available.
pub struct RootManager<S> {
    store: Arc<S>,
}

impl<S> Clone for RootManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: MetadataStore> RootManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Register a root pinning the given NAR ids. The NARs must already
    /// be registered; typically the caller pins a full closure computed
    /// during indexing.
    pub async fn register_root(&self, meta: &RootMeta, nar_ids: &[i64]) -> EngineResult<Uuid> {
        let root_id = self.store.create_root(meta).await?;
        self.store.pin_root_nars(root_id, nar_ids).await?;
        self.recompute_status(root_id).await?;
        tracing::info!(%root_id, pins = nar_ids.len(), "registered root");
        Ok(root_id)
    }

    /// Pin additional NARs onto an existing root. Pins are monotonic.
    pub async fn pin(&self, root_id: Uuid, nar_ids: &[i64]) -> EngineResult<()> {
        self.store.pin_root_nars(root_id, nar_ids).await?;
        self.recompute_status(root_id).await?;
        Ok(())
    }

    /// Flag that downloads for this root's pins have started.
    pub async fn mark_downloading(&self, root_id: Uuid) -> EngineResult<RootStatus> {
        let current = self.current_status(root_id).await?;
        if current == RootStatus::Pending {
            self.store
                .set_root_status(root_id, RootStatus::Downloading)
                .await?;
        }
        self.recompute_status(root_id).await
    }

    /// Recompute the status of every root pinning the given NAR.
    /// Called by the download pipeline after a NAR becomes available.
    pub async fn on_nar_available(&self, nar_id: i64) -> EngineResult<()> {
        for root_id in self.store.roots_pinning(nar_id).await? {
            self.recompute_status(root_id).await?;
        }
        Ok(())
    }

    /// Unregister a root. Its pins go away; the pinned NARs stay until
    /// the garbage collector reclaims them.
    pub async fn release(&self, root_id: Uuid) -> EngineResult<()> {
        self.store.release_root(root_id).await?;
        Ok(())
    }

    /// Recompute and persist the root's status from its pin counts.
    pub async fn recompute_status(&self, root_id: Uuid) -> EngineResult<RootStatus> {
        let current = self.current_status(root_id).await?;
        let counts = self.store.root_pin_status_counts(root_id).await?;
        let next = next_status(current, &counts);
        if next != current {
            self.store.set_root_status(root_id, next).await?;
            tracing::debug!(%root_id, from = %current, to = %next, "root status");
        }
        Ok(next)
    }

    async fn current_status(&self, root_id: Uuid) -> EngineResult<RootStatus> {
        let row = self
            .store
            .get_root(root_id)
            .await?
            .ok_or_else(|| EngineError::Metadata(MetadataError::NotFound(format!("root {root_id}"))))?;
        Ok(row.status()?)
    }
}

/// A root is Available once every pin is; before that it stays Pending
/// until downloads begin and Downloading afterwards. An empty pin set
/// never reaches Available.
fn next_status(current: RootStatus, counts: &RootPinCounts) -> RootStatus {
    if counts.total > 0 && counts.available == counts.total {
        RootStatus::Available
    } else if current == RootStatus::Pending {
        RootStatus::Pending
    } else {
        RootStatus::Downloading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(total: i64, pending: i64, available: i64) -> RootPinCounts {
        RootPinCounts {
            total,
            pending,
            available,
        }
    }

    #[test]
    fn all_available_pins_make_the_root_available() {
        assert_eq!(
            next_status(RootStatus::Downloading, &counts(3, 0, 3)),
            RootStatus::Available
        );
        assert_eq!(
            next_status(RootStatus::Pending, &counts(1, 0, 1)),
            RootStatus::Available
        );
    }

    #[test]
    fn pending_holds_until_downloads_begin() {
        assert_eq!(
            next_status(RootStatus::Pending, &counts(3, 3, 0)),
            RootStatus::Pending
        );
        assert_eq!(
            next_status(RootStatus::Downloading, &counts(3, 2, 1)),
            RootStatus::Downloading
        );
    }

    #[test]
    fn empty_pin_set_never_becomes_available() {
        assert_eq!(
            next_status(RootStatus::Pending, &counts(0, 0, 0)),
            RootStatus::Pending
        );
    }
}
