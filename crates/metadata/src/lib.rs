//! Metadata store abstraction and SQLite implementation for Stockpile.
//!
//! This crate provides the control-plane data model of the mirror:
//! - The global NAR table and its availability state machine
//! - The reference edge set between NARs
//! - Named roots and their pin associations
//! - Generation snapshots with their scoped nar-info views
//! - The atomic garbage-collection batch operations

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{GcRepo, GenerationRepo, NarRepo, ReferenceRepo, RootRepo};
pub use store::{MetadataStore, SqliteStore};
