//! Database models mapping to the metadata schema.
//!
//! Status columns are persisted as the single-letter codes defined in
//! `stockpile_core::status`; rows carry the raw string plus a typed
//! accessor so schema mapping stays in one place.

use crate::error::MetadataResult;
use sqlx::FromRow;
use stockpile_core::{
    Compression, GenerationExtraInfo, GenerationStatus, NarMeta, NarStatus, RootMeta, RootStatus,
};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Global NAR table
// =============================================================================

/// One row of the global NAR table.
#[derive(Debug, Clone, FromRow)]
pub struct NarRow {
    pub id: i64,
    pub hash: String,
    pub name: String,
    pub status: String,
    pub url: String,
    pub compression: String,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub nar_hash: String,
    pub nar_size: i64,
    pub deriver: Option<String>,
    pub sig: Option<String>,
    pub ca: Option<String>,
    pub registered_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl NarRow {
    pub fn status(&self) -> MetadataResult<NarStatus> {
        Ok(NarStatus::parse(&self.status)?)
    }

    /// Reassemble the domain-level metadata from the row.
    pub fn meta(&self) -> MetadataResult<NarMeta> {
        Ok(NarMeta {
            url: self.url.clone(),
            compression: self.compression.parse::<Compression>()?,
            file_hash: self.file_hash.clone(),
            file_size: self.file_size.map(|s| s as u64),
            nar_hash: self.nar_hash.clone(),
            nar_size: self.nar_size as u64,
            deriver: self.deriver.clone(),
            sig: self.sig.clone(),
            ca: self.ca.clone(),
        })
    }
}

/// Integrity values observed for a downloaded blob, checked against the
/// registered row before a NAR may become Available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityCheck {
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub nar_hash: String,
    pub nar_size: u64,
}

// =============================================================================
// Roots
// =============================================================================

/// A named GC root pinning a set of NARs.
#[derive(Debug, Clone, FromRow)]
pub struct RootRow {
    pub root_id: Uuid,
    pub meta: String,
    pub status: String,
    pub created_at: OffsetDateTime,
}

impl RootRow {
    pub fn status(&self) -> MetadataResult<RootStatus> {
        Ok(RootStatus::parse(&self.status)?)
    }

    pub fn meta(&self) -> MetadataResult<RootMeta> {
        Ok(serde_json::from_str(&self.meta)?)
    }
}

/// Pin status summary for one root, used to derive its status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct RootPinCounts {
    pub total: i64,
    pub pending: i64,
    pub available: i64,
}

// =============================================================================
// Generations
// =============================================================================

/// A versioned snapshot of an upstream cache.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub id: i64,
    pub cache_url: String,
    pub extra_info: String,
    pub status: String,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub total_paths: Option<i64>,
    pub total_file_size: Option<i64>,
    pub retired_at: Option<OffsetDateTime>,
}

impl GenerationRow {
    pub fn status(&self) -> MetadataResult<GenerationStatus> {
        Ok(GenerationStatus::parse(&self.status)?)
    }

    pub fn extra_info(&self) -> MetadataResult<GenerationExtraInfo> {
        Ok(serde_json::from_str(&self.extra_info)?)
    }

    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }
}

/// Logical root entry of a generation. `nar_info_id` starts NULL and is
/// resolved once indexing records the matching nar-info row.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRootRow {
    pub generation_id: i64,
    pub hash: String,
    pub name: String,
    pub nar_info_id: Option<i64>,
}

/// Generation-scoped view of one NAR's metadata and availability.
#[derive(Debug, Clone, FromRow)]
pub struct NarInfoRow {
    pub id: i64,
    pub generation_id: i64,
    pub hash: String,
    pub name: String,
    pub available: bool,
    pub url: String,
    pub compression: String,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub nar_hash: String,
    pub nar_size: i64,
    pub deriver: Option<String>,
    pub sig: Option<String>,
    pub ca: Option<String>,
}
