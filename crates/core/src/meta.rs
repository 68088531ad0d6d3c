//! Structured metadata blobs attached to roots and generations.
//!
//! These were free-form JSON in earlier iterations of the schema; the
//! fields are now enumerated and carry an explicit format version so the
//! liveness and transition logic never has to interpret opaque payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Current metadata blob format version.
pub const META_VERSION: u32 = 1;

fn default_version() -> u32 {
    META_VERSION
}

/// Extra information describing where a generation snapshot came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationExtraInfo {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_revision: Option<String>,
}

impl Default for GenerationExtraInfo {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            channel_url: None,
            git_revision: None,
        }
    }
}

/// Metadata describing the entry point a root pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootMeta {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option", default)]
    pub fetch_time: Option<OffsetDateTime>,
}

impl Default for RootMeta {
    fn default() -> Self {
        Self {
            version: META_VERSION,
            description: None,
            channel_url: None,
            git_revision: None,
            fetch_time: None,
        }
    }
}
