//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{GcRepo, GenerationRepo, NarRepo, ReferenceRepo, RootRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    NarRepo + ReferenceRepo + RootRepo + GenerationRepo + GcRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Stamped into `PRAGMA application_id` so a foreign SQLite file is
    /// rejected instead of silently migrated.
    const APPLICATION_ID: i64 = 0x53_74_6f_63; // "Stoc"
    const USER_VERSION: i64 = 1;

    /// Create a new SQLite store and migrate it.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MetadataError::Internal(format!("create {parent:?}: {e}")))?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // serializes writers and keeps registration races benign.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create an in-memory store, for tests and dry runs.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn query_version(&self) -> MetadataResult<(i64, i64)> {
        let app_id: i64 = sqlx::query_scalar("PRAGMA application_id")
            .fetch_one(&self.pool)
            .await?;
        let user_version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok((app_id, user_version))
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        let (app_id, user_version) = self.query_version().await?;

        if (app_id, user_version) == (0, 0) {
            tracing::info!("initializing fresh metadata schema");
        } else if app_id != Self::APPLICATION_ID || user_version > Self::USER_VERSION {
            return Err(MetadataError::Internal(format!(
                "incompatible database: expected (app_id, user_version) ({}, <={}), found ({}, {})",
                Self::APPLICATION_ID,
                Self::USER_VERSION,
                app_id,
                user_version,
            )));
        }

        // Schema statements are idempotent; version stamps make older
        // files upgradeable in place with targeted ALTERs added per bump.
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        sqlx::query(&format!("PRAGMA application_id = {}", Self::APPLICATION_ID))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("PRAGMA user_version = {}", Self::USER_VERSION))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use stockpile_core::{
        GenerationExtraInfo, GenerationStatus, NarInfo, NarMeta, NarStatus, RootMeta, RootStatus,
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Compare observed download integrity values with the registered row.
    fn verify_integrity(row: &NarRow, check: &IntegrityCheck) -> MetadataResult<()> {
        let mismatch = |field: &'static str, expected: &str, actual: &str| {
            Err(MetadataError::IntegrityMismatch {
                hash: row.hash.clone(),
                field,
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        };

        if check.nar_hash != row.nar_hash {
            return mismatch("nar_hash", &row.nar_hash, &check.nar_hash);
        }
        if check.nar_size as i64 != row.nar_size {
            return mismatch("nar_size", &row.nar_size.to_string(), &check.nar_size.to_string());
        }
        if let (Some(expected), Some(actual)) = (&row.file_hash, &check.file_hash) {
            if expected != actual {
                return mismatch("file_hash", expected, actual);
            }
        }
        if let (Some(expected), Some(actual)) = (row.file_size, check.file_size) {
            if expected != actual as i64 {
                return mismatch("file_size", &expected.to_string(), &actual.to_string());
            }
        }
        Ok(())
    }

    #[async_trait]
    impl NarRepo for SqliteStore {
        async fn register_nar(
            &self,
            hash: &str,
            name: &str,
            meta: &NarMeta,
        ) -> MetadataResult<i64> {
            let now = OffsetDateTime::now_utc();
            let mut tx = self.pool.begin().await?;

            let existing: Option<(i64, String)> =
                sqlx::query_as("SELECT id, status FROM nars WHERE hash = ?")
                    .bind(hash)
                    .fetch_optional(&mut *tx)
                    .await?;

            let id = match existing {
                Some((id, status)) if status == NarStatus::Trashed.as_str() => {
                    // Resurrection: a collected NAR is re-admitted with the
                    // new metadata and starts over as Pending.
                    sqlx::query(
                        r#"
                        UPDATE nars SET
                            name = ?, status = 'P', url = ?, compression = ?,
                            file_hash = ?, file_size = ?, nar_hash = ?, nar_size = ?,
                            deriver = ?, sig = ?, ca = ?, updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(name)
                    .bind(&meta.url)
                    .bind(meta.compression.to_string())
                    .bind(&meta.file_hash)
                    .bind(meta.file_size.map(|s| s as i64))
                    .bind(&meta.nar_hash)
                    .bind(meta.nar_size as i64)
                    .bind(&meta.deriver)
                    .bind(&meta.sig)
                    .bind(&meta.ca)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    tracing::debug!(hash, id, "resurrected trashed nar");
                    id
                }
                // First writer wins on id, existing metadata wins on content.
                Some((id, _)) => id,
                None => {
                    let id: i64 = sqlx::query_scalar(
                        r#"
                        INSERT INTO nars
                            ( hash, name, status, url, compression
                            , file_hash, file_size, nar_hash, nar_size
                            , deriver, sig, ca, registered_at, updated_at )
                        VALUES (?, ?, 'P', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        RETURNING id
                        "#,
                    )
                    .bind(hash)
                    .bind(name)
                    .bind(&meta.url)
                    .bind(meta.compression.to_string())
                    .bind(&meta.file_hash)
                    .bind(meta.file_size.map(|s| s as i64))
                    .bind(&meta.nar_hash)
                    .bind(meta.nar_size as i64)
                    .bind(&meta.deriver)
                    .bind(&meta.sig)
                    .bind(&meta.ca)
                    .bind(now)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await?;
                    id
                }
            };

            tx.commit().await?;
            Ok(id)
        }

        async fn mark_nar_available(
            &self,
            id: i64,
            check: &IntegrityCheck,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, NarRow>("SELECT * FROM nars WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("nar id {id}")))?;

            if row.status()? == NarStatus::Trashed {
                return Err(MetadataError::InvalidTransition {
                    entity: "nar",
                    from: NarStatus::Trashed.as_str().to_string(),
                    to: NarStatus::Available.as_str().to_string(),
                });
            }
            verify_integrity(&row, check)?;

            sqlx::query(
                "UPDATE nars SET status = 'A', updated_at = ? WHERE id = ? AND status IN ('P', 'A')",
            )
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_nar(&self, id: i64) -> MetadataResult<Option<NarRow>> {
            let row = sqlx::query_as::<_, NarRow>("SELECT * FROM nars WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_nar_by_hash(&self, hash: &str) -> MetadataResult<Option<NarRow>> {
            let row = sqlx::query_as::<_, NarRow>("SELECT * FROM nars WHERE hash = ?")
                .bind(hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_nars_by_status(&self, status: NarStatus) -> MetadataResult<Vec<NarRow>> {
            let rows =
                sqlx::query_as::<_, NarRow>("SELECT * FROM nars WHERE status = ? ORDER BY id")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl ReferenceRepo for SqliteStore {
        async fn add_nar_ref(&self, nar_id: i64, ref_id: i64) -> MetadataResult<()> {
            sqlx::query("INSERT OR IGNORE INTO nar_refs (nar_id, ref_id) VALUES (?, ?)")
                .bind(nar_id)
                .bind(ref_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn nar_refs_snapshot(&self) -> MetadataResult<Vec<(i64, i64)>> {
            let rows: Vec<(i64, i64)> =
                sqlx::query_as("SELECT nar_id, ref_id FROM nar_refs ORDER BY nar_id, ref_id")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn references_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> = sqlx::query_scalar(
                "SELECT ref_id FROM nar_refs WHERE nar_id = ? AND ref_id != nar_id ORDER BY ref_id",
            )
            .bind(nar_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn referrers_of(&self, nar_id: i64) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> = sqlx::query_scalar(
                "SELECT nar_id FROM nar_refs WHERE ref_id = ? AND nar_id != ref_id ORDER BY nar_id",
            )
            .bind(nar_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl RootRepo for SqliteStore {
        async fn create_root(&self, meta: &RootMeta) -> MetadataResult<Uuid> {
            let root_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO roots (root_id, meta, status, created_at) VALUES (?, ?, 'P', ?)",
            )
            .bind(root_id)
            .bind(serde_json::to_string(meta)?)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await?;
            Ok(root_id)
        }

        async fn get_root(&self, root_id: Uuid) -> MetadataResult<Option<RootRow>> {
            let row = sqlx::query_as::<_, RootRow>("SELECT * FROM roots WHERE root_id = ?")
                .bind(root_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_roots(&self) -> MetadataResult<Vec<RootRow>> {
            let rows = sqlx::query_as::<_, RootRow>("SELECT * FROM roots ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn pin_root_nars(&self, root_id: Uuid, nar_ids: &[i64]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM roots WHERE root_id = ?")
                    .bind(root_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(format!("root {root_id}")));
            }

            for nar_id in nar_ids {
                sqlx::query("INSERT OR IGNORE INTO root_nars (root_id, nar_id) VALUES (?, ?)")
                    .bind(root_id)
                    .bind(nar_id)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn root_pins(&self, root_id: Uuid) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> =
                sqlx::query_scalar("SELECT nar_id FROM root_nars WHERE root_id = ? ORDER BY nar_id")
                    .bind(root_id)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn roots_pinning(&self, nar_id: i64) -> MetadataResult<Vec<Uuid>> {
            let rows: Vec<Uuid> =
                sqlx::query_scalar("SELECT root_id FROM root_nars WHERE nar_id = ?")
                    .bind(nar_id)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn root_pin_status_counts(&self, root_id: Uuid) -> MetadataResult<RootPinCounts> {
            let counts = sqlx::query_as::<_, RootPinCounts>(
                r#"
                SELECT COUNT(*) AS total,
                       COALESCE(SUM(CASE WHEN n.status = 'P' THEN 1 ELSE 0 END), 0) AS pending,
                       COALESCE(SUM(CASE WHEN n.status = 'A' THEN 1 ELSE 0 END), 0) AS available
                FROM root_nars rn
                JOIN nars n ON n.id = rn.nar_id
                WHERE rn.root_id = ?
                "#,
            )
            .bind(root_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(counts)
        }

        async fn set_root_status(&self, root_id: Uuid, status: RootStatus) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE roots SET status = ? WHERE root_id = ?")
                .bind(status.as_str())
                .bind(root_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("root {root_id}")));
            }
            Ok(())
        }

        async fn release_root(&self, root_id: Uuid) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM root_nars WHERE root_id = ?")
                .bind(root_id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM roots WHERE root_id = ?")
                .bind(root_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("root {root_id}")));
            }

            tx.commit().await?;
            tracing::debug!(%root_id, "released root");
            Ok(())
        }
    }

    #[async_trait]
    impl GenerationRepo for SqliteStore {
        async fn create_generation(
            &self,
            cache_url: &str,
            extra: &GenerationExtraInfo,
        ) -> MetadataResult<i64> {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO generations (cache_url, extra_info, status, start_time)
                VALUES (?, ?, 'P', ?)
                RETURNING id
                "#,
            )
            .bind(cache_url)
            .bind(serde_json::to_string(extra)?)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;
            tracing::info!(generation_id = id, cache_url, "created generation");
            Ok(id)
        }

        async fn get_generation(&self, id: i64) -> MetadataResult<Option<GenerationRow>> {
            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_generations(&self) -> MetadataResult<Vec<GenerationRow>> {
            let rows = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn set_generation_status(
            &self,
            id: i64,
            to: GenerationStatus,
        ) -> MetadataResult<()> {
            if to == GenerationStatus::Finished {
                return Err(MetadataError::Internal(
                    "finished is only reachable through finish_generation".to_string(),
                ));
            }

            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("generation {id}")))?;
            let from = row.status()?;
            if !from.can_transition_to(to) {
                return Err(MetadataError::InvalidTransition {
                    entity: "generation",
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                });
            }

            let result = sqlx::query("UPDATE generations SET status = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(id)
                .bind(from.as_str())
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(db_err))
                    if db_err.message().contains("UNIQUE constraint")
                        && db_err.message().contains("generations") =>
                {
                    // The partial unique index serializes the active
                    // candidate per cache_url. SQLite reports the
                    // violation either by column ("UNIQUE constraint
                    // failed: generations.cache_url") or by index name,
                    // so match both forms.
                    return Err(MetadataError::AlreadyActive {
                        cache_url: row.cache_url,
                    });
                }
                Err(e) => return Err(e.into()),
            }

            tx.commit().await?;
            tracing::info!(generation_id = id, from = %from, to = %to, "generation transition");
            Ok(())
        }

        async fn add_generation_root(
            &self,
            generation_id: i64,
            hash: &str,
            name: &str,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO generation_roots (generation_id, hash, name)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(generation_id)
            .bind(hash)
            .bind(name)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn generation_roots(
            &self,
            generation_id: i64,
        ) -> MetadataResult<Vec<GenerationRootRow>> {
            let rows = sqlx::query_as::<_, GenerationRootRow>(
                "SELECT * FROM generation_roots WHERE generation_id = ? ORDER BY hash",
            )
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn upsert_nar_info(
            &self,
            generation_id: i64,
            info: &NarInfo,
        ) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            let hash = info.store_path.hash().as_str();
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO nar_infos
                    ( generation_id, hash, name, available, url, compression
                    , file_hash, file_size, nar_hash, nar_size, deriver, sig, ca )
                VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(generation_id, hash) DO UPDATE SET
                    name = excluded.name, url = excluded.url,
                    compression = excluded.compression,
                    file_hash = excluded.file_hash, file_size = excluded.file_size,
                    nar_hash = excluded.nar_hash, nar_size = excluded.nar_size,
                    deriver = excluded.deriver, sig = excluded.sig, ca = excluded.ca
                RETURNING id
                "#,
            )
            .bind(generation_id)
            .bind(hash)
            .bind(info.store_path.name())
            .bind(&info.meta.url)
            .bind(info.meta.compression.to_string())
            .bind(&info.meta.file_hash)
            .bind(info.meta.file_size.map(|s| s as i64))
            .bind(&info.meta.nar_hash)
            .bind(info.meta.nar_size as i64)
            .bind(&info.meta.deriver)
            .bind(&info.meta.sig)
            .bind(&info.meta.ca)
            .fetch_one(&mut *tx)
            .await?;

            // Resolve the logical root link once its metadata is known.
            sqlx::query(
                "UPDATE generation_roots SET nar_info_id = ? WHERE generation_id = ? AND hash = ?",
            )
            .bind(id)
            .bind(generation_id)
            .bind(hash)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(id)
        }

        async fn get_nar_info(
            &self,
            generation_id: i64,
            hash: &str,
        ) -> MetadataResult<Option<NarInfoRow>> {
            let row = sqlx::query_as::<_, NarInfoRow>(
                "SELECT * FROM nar_infos WHERE generation_id = ? AND hash = ?",
            )
            .bind(generation_id)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn set_nar_info_available(
            &self,
            generation_id: i64,
            hash: &str,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE nar_infos SET available = 1 WHERE generation_id = ? AND hash = ?",
            )
            .bind(generation_id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "nar_info {hash} in generation {generation_id}"
                )));
            }
            Ok(())
        }

        async fn add_nar_info_ref(
            &self,
            generation_id: i64,
            from_info_id: i64,
            to_info_id: i64,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO nar_info_refs (generation_id, nar_info_id, ref_info_id)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(generation_id)
            .bind(from_info_id)
            .bind(to_info_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn nar_info_hashes(&self, generation_id: i64) -> MetadataResult<Vec<String>> {
            let rows: Vec<String> = sqlx::query_scalar(
                "SELECT hash FROM nar_infos WHERE generation_id = ? ORDER BY hash",
            )
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn unavailable_nar_infos(&self, generation_id: i64) -> MetadataResult<Vec<String>> {
            let rows: Vec<String> = sqlx::query_scalar(
                "SELECT hash FROM nar_infos WHERE generation_id = ? AND available = 0 ORDER BY hash",
            )
            .bind(generation_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn downloading_generations_with_hash(&self, hash: &str) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> = sqlx::query_scalar(
                r#"
                SELECT g.id FROM generations g
                JOIN nar_infos ni ON ni.generation_id = g.id
                WHERE ni.hash = ? AND g.status = 'D'
                ORDER BY g.id
                "#,
            )
            .bind(hash)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn finish_generation(&self, id: i64) -> MetadataResult<GenerationRow> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("generation {id}")))?;
            let from = row.status()?;
            if from != GenerationStatus::Downloading {
                return Err(MetadataError::InvalidTransition {
                    entity: "generation",
                    from: from.as_str().to_string(),
                    to: GenerationStatus::Finished.as_str().to_string(),
                });
            }

            let missing: Vec<String> = sqlx::query_scalar(
                "SELECT hash FROM nar_infos WHERE generation_id = ? AND available = 0 ORDER BY hash",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
            if !missing.is_empty() {
                return Err(MetadataError::Incomplete {
                    generation_id: id,
                    missing,
                });
            }

            let (total_paths, total_file_size): (i64, i64) = sqlx::query_as(
                r#"
                SELECT COUNT(*), COALESCE(SUM(COALESCE(file_size, nar_size)), 0)
                FROM nar_infos WHERE generation_id = ?
                "#,
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            // status and end_time flip in one statement: the invariant
            // `Finished <=> end_time set` never has a half-written state.
            sqlx::query(
                r#"
                UPDATE generations
                SET status = 'F', end_time = ?, total_paths = ?, total_file_size = ?
                WHERE id = ? AND status = 'D'
                "#,
            )
            .bind(OffsetDateTime::now_utc())
            .bind(total_paths)
            .bind(total_file_size)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::info!(generation_id = id, total_paths, total_file_size, "generation finished");
            Ok(row)
        }

        async fn cancel_generation(&self, id: i64) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("generation {id}")))?;
            let from = row.status()?;
            if !from.can_transition_to(GenerationStatus::Canceled) {
                return Err(MetadataError::InvalidTransition {
                    entity: "generation",
                    from: from.as_str().to_string(),
                    to: GenerationStatus::Canceled.as_str().to_string(),
                });
            }

            // end_time stays NULL: canceled generations never look finished.
            sqlx::query(
                "UPDATE generations SET status = 'C' WHERE id = ? AND status IN ('P', 'I', 'D')",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            tracing::info!(generation_id = id, from = %from, "generation canceled");
            Ok(())
        }

        async fn retire_generation(&self, id: i64) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("generation {id}")))?;
            if row.is_retired() {
                return Ok(());
            }
            let from = row.status()?;
            if from != GenerationStatus::Finished {
                return Err(MetadataError::InvalidTransition {
                    entity: "generation",
                    from: from.as_str().to_string(),
                    to: "retired".to_string(),
                });
            }

            sqlx::query("UPDATE generations SET retired_at = ? WHERE id = ?")
                .bind(OffsetDateTime::now_utc())
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            tracing::info!(generation_id = id, "generation retired");
            Ok(())
        }
    }

    #[async_trait]
    impl GcRepo for SqliteStore {
        async fn live_frontier(&self) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> = sqlx::query_scalar(
                r#"
                SELECT nar_id AS id FROM root_nars
                UNION
                SELECT n.id AS id FROM nars n
                JOIN nar_infos ni ON ni.hash = n.hash
                JOIN generations g ON g.id = ni.generation_id
                WHERE g.status = 'F' AND g.retired_at IS NULL
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn collectable_nar_ids(&self) -> MetadataResult<Vec<i64>> {
            let rows: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM nars WHERE status != 'T' ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn trash_unreachable(&self, nar_ids: &[i64]) -> MetadataResult<u64> {
            if nar_ids.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;

            // The batch goes into a temp table so validation and deletion
            // can run as whole-set queries regardless of batch size.
            sqlx::query("CREATE TEMP TABLE IF NOT EXISTS gc_batch (id INTEGER PRIMARY KEY)")
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM gc_batch").execute(&mut *tx).await?;
            for chunk in nar_ids.chunks(500) {
                let placeholders: Vec<&str> = chunk.iter().map(|_| "(?)").collect();
                let query = format!(
                    "INSERT OR IGNORE INTO gc_batch (id) VALUES {}",
                    placeholders.join(", ")
                );
                let mut q = sqlx::query(&query);
                for id in chunk {
                    q = q.bind(id);
                }
                q.execute(&mut *tx).await?;
            }

            // Re-validate liveness of every candidate at delete time.
            // A non-self edge from outside the batch, a surviving root
            // pin, or membership in a finished non-retired generation
            // means the frontier snapshot was stale: abort untouched.
            let edge_violation: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT r.ref_id FROM nar_refs r
                WHERE r.ref_id IN (SELECT id FROM gc_batch)
                  AND r.nar_id != r.ref_id
                  AND r.nar_id NOT IN (SELECT id FROM gc_batch)
                LIMIT 1
                "#,
            )
            .fetch_optional(&mut *tx)
            .await?;
            let pin_violation: Option<i64> = sqlx::query_scalar(
                "SELECT nar_id FROM root_nars WHERE nar_id IN (SELECT id FROM gc_batch) LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?;
            let generation_violation: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT n.id FROM nars n
                JOIN nar_infos ni ON ni.hash = n.hash
                JOIN generations g ON g.id = ni.generation_id
                WHERE g.status = 'F' AND g.retired_at IS NULL
                  AND n.id IN (SELECT id FROM gc_batch)
                LIMIT 1
                "#,
            )
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(nar_id) = edge_violation.or(pin_violation).or(generation_violation) {
                // Dropping the transaction rolls everything back.
                return Err(MetadataError::LiveReferenceViolation { nar_id });
            }

            // Cascade: every edge owned by a batch member goes with it,
            // self-edges included.
            sqlx::query("DELETE FROM nar_refs WHERE nar_id IN (SELECT id FROM gc_batch)")
                .execute(&mut *tx)
                .await?;

            // Restrict: nothing may still point into the batch.
            let survivors: Vec<(i64, String)> = sqlx::query_as(
                r#"
                SELECT r.ref_id, n.hash FROM nar_refs r
                JOIN nars n ON n.id = r.nar_id
                WHERE r.ref_id IN (SELECT id FROM gc_batch)
                "#,
            )
            .fetch_all(&mut *tx)
            .await?;
            if let Some((nar_id, _)) = survivors.first() {
                return Err(MetadataError::Referenced {
                    nar_id: *nar_id,
                    referrers: survivors.iter().map(|(_, hash)| hash.clone()).collect(),
                });
            }

            let result = sqlx::query(
                "UPDATE nars SET status = 'T', updated_at = ? WHERE id IN (SELECT id FROM gc_batch) AND status != 'T'",
            )
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM gc_batch").execute(&mut *tx).await?;
            tx.commit().await?;

            let trashed = result.rows_affected();
            tracing::info!(trashed, "trashed unreachable nars");
            Ok(trashed)
        }

        async fn purge_trashed(&self) -> MetadataResult<u64> {
            let mut tx = self.pool.begin().await?;

            // Self-edges and any other leftover owned edges are pruned
            // together with the record.
            sqlx::query(
                "DELETE FROM nar_refs WHERE nar_id IN (SELECT id FROM nars WHERE status = 'T')",
            )
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query(
                "DELETE FROM nars WHERE status = 'T' AND id NOT IN (SELECT ref_id FROM nar_refs)",
            )
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(result.rows_affected())
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Global NAR table
CREATE TABLE IF NOT EXISTS nars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'P',
    url TEXT NOT NULL,
    compression TEXT NOT NULL,
    file_hash TEXT,
    file_size INTEGER,
    nar_hash TEXT NOT NULL,
    nar_size INTEGER NOT NULL,
    deriver TEXT,
    sig TEXT,
    ca TEXT,
    registered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_nars_status ON nars(status);

-- Global reference edges; self-edges are recorded but excluded from
-- liveness, and removed together with their owning row.
CREATE TABLE IF NOT EXISTS nar_refs (
    nar_id INTEGER NOT NULL,
    ref_id INTEGER NOT NULL,
    PRIMARY KEY (nar_id, ref_id)
);
CREATE INDEX IF NOT EXISTS idx_nar_refs_ref ON nar_refs(ref_id);

-- Roots
CREATE TABLE IF NOT EXISTS roots (
    root_id BLOB PRIMARY KEY,
    meta TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'P',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS root_nars (
    root_id BLOB NOT NULL,
    nar_id INTEGER NOT NULL,
    PRIMARY KEY (root_id, nar_id),
    FOREIGN KEY (root_id) REFERENCES roots(root_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_root_nars_nar ON root_nars(nar_id);

-- Generations
CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_url TEXT NOT NULL,
    extra_info TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'P',
    start_time TEXT NOT NULL,
    end_time TEXT,
    total_paths INTEGER,
    total_file_size INTEGER,
    retired_at TEXT
);
-- One active candidate (Indexing or Downloading) per upstream cache.
CREATE UNIQUE INDEX IF NOT EXISTS idx_generations_active_candidate
    ON generations(cache_url) WHERE status IN ('I', 'D');

-- Logical roots of a generation; nar_info_id resolves during indexing.
CREATE TABLE IF NOT EXISTS generation_roots (
    generation_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    name TEXT NOT NULL,
    nar_info_id INTEGER,
    PRIMARY KEY (generation_id, hash),
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);

-- Generation-scoped view of NAR metadata and availability
CREATE TABLE IF NOT EXISTS nar_infos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generation_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    name TEXT NOT NULL,
    available INTEGER NOT NULL DEFAULT 0,
    url TEXT NOT NULL,
    compression TEXT NOT NULL,
    file_hash TEXT,
    file_size INTEGER,
    nar_hash TEXT NOT NULL,
    nar_size INTEGER NOT NULL,
    deriver TEXT,
    sig TEXT,
    ca TEXT,
    UNIQUE (generation_id, hash),
    FOREIGN KEY (generation_id) REFERENCES generations(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_nar_infos_hash ON nar_infos(hash);
CREATE INDEX IF NOT EXISTS idx_nar_infos_available ON nar_infos(generation_id, available);

-- Generation-scoped reference edges between nar_info rows
CREATE TABLE IF NOT EXISTS nar_info_refs (
    generation_id INTEGER NOT NULL,
    nar_info_id INTEGER NOT NULL,
    ref_info_id INTEGER NOT NULL,
    PRIMARY KEY (generation_id, nar_info_id, ref_info_id)
);
"#;
