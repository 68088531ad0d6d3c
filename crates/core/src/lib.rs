//! Core domain types and shared logic for the Stockpile cache mirror.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Store path identifiers and hashes
//! - NAR metadata and the `.narinfo` text format
//! - Lifecycle status enums for NARs, roots, and generations
//! - Structured, versioned metadata blobs for roots and generations

pub mod error;
pub mod meta;
pub mod narinfo;
pub mod status;
pub mod store_path;

pub use error::{Error, Result};
pub use meta::{GenerationExtraInfo, RootMeta};
pub use narinfo::{Compression, NarInfo, NarMeta};
pub use status::{GenerationStatus, NarStatus, RootStatus};
pub use store_path::{StorePath, StorePathHash};
