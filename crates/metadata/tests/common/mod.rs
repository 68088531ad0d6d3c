//! Metadata store test utilities.

use stockpile_metadata::{MetadataResult, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    store: Arc<SqliteStore>,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new file-backed test store under a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let store = SqliteStore::new(&db_path).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        })
    }

    /// Create a new in-memory store (faster for tests).
    pub async fn in_memory() -> MetadataResult<Self> {
        let store = SqliteStore::in_memory().await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: None,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }
}

pub mod fixtures {
    use stockpile_core::{Compression, NarInfo, NarMeta, StorePath};
    use stockpile_metadata::models::IntegrityCheck;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    /// The Nix base32 alphabet (no e, o, u, t).
    const BASE32: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

    /// Deterministic 32-character store path hash derived from a seed.
    pub fn store_hash(seed: &str) -> String {
        let mut out = String::with_capacity(32);
        let mut state = {
            let mut h = DefaultHasher::new();
            seed.hash(&mut h);
            h.finish()
        };
        for i in 0..32u64 {
            let mut h = DefaultHasher::new();
            (state, i).hash(&mut h);
            state = h.finish();
            out.push(BASE32[(state % 32) as usize] as char);
        }
        out
    }

    /// NAR metadata for a named fixture package.
    pub fn nar_meta(seed: &str) -> NarMeta {
        NarMeta {
            url: format!("nar/{}.nar.xz", store_hash(seed)),
            compression: Compression::Xz,
            file_hash: Some(format!("sha256:{}file", store_hash(seed))),
            file_size: Some(1024),
            nar_hash: format!("sha256:{}nar", store_hash(seed)),
            nar_size: 4096,
            deriver: None,
            sig: Some("cache.example.org-1:c2lnbmF0dXJl".to_string()),
            ca: None,
        }
    }

    /// An integrity check that agrees with `nar_meta(seed)`.
    pub fn matching_integrity(meta: &NarMeta) -> IntegrityCheck {
        IntegrityCheck {
            file_hash: meta.file_hash.clone(),
            file_size: meta.file_size,
            nar_hash: meta.nar_hash.clone(),
            nar_size: meta.nar_size,
        }
    }

    /// A full narinfo document for a named fixture package.
    pub fn nar_info(seed: &str, name: &str, references: &[(&str, &str)]) -> NarInfo {
        let store_path = StorePath::new(
            store_hash(seed).parse().expect("valid fixture hash"),
            name,
        )
        .expect("valid fixture path");
        NarInfo {
            store_path,
            meta: nar_meta(seed),
            references: references
                .iter()
                .map(|(ref_seed, ref_name)| format!("{}-{}", store_hash(ref_seed), ref_name))
                .collect(),
        }
    }
}
