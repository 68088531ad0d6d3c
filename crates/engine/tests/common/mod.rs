//! Engine test utilities.

pub mod fixtures;
pub mod mocks;

use std::sync::Arc;
use stockpile_metadata::{MetadataResult, SqliteStore};
use tempfile::TempDir;

/// A metadata store fixture that cleans up on drop.
#[allow(dead_code)]
pub struct TestStore {
    store: Arc<SqliteStore>,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestStore {
    /// File-backed store under a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db")).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        })
    }

    /// In-memory store (faster for tests).
    pub async fn in_memory() -> MetadataResult<Self> {
        let store = SqliteStore::in_memory().await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: None,
        })
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }
}
