//! PostgreSQL cache repository.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use crate::cache::{CacheRepository, MatchKey, RemoteIdMapping, RunCaches};
use crate::error::{CacheError, CacheResult};
use crate::types::{Side, SyncId};

/// Cache repository over the `sync_match_keys` and `sync_remote_id_mappings`
/// tables.
#[derive(Debug, Clone)]
pub struct PgCacheRepository {
    pool: PgPool,
}

impl PgCacheRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the cache schema.
    pub async fn run_migrations(&self) -> CacheResult<()> {
        info!("Running cache migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Cache migrations completed");
        Ok(())
    }

    async fn replace_match_keys(
        tx: &mut Transaction<'_, Postgres>,
        sync_id: SyncId,
        side: Side,
        collection_id: &str,
        keys: &[MatchKey],
    ) -> CacheResult<()> {
        sqlx::query(
            r#"
            DELETE FROM sync_match_keys
            WHERE sync_id = $1 AND side = $2 AND collection_id = $3
            "#,
        )
        .bind(sync_id.as_uuid())
        .bind(side.as_str())
        .bind(collection_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| CacheError::database("delete match keys", e))?;

        for (position, key) in keys.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sync_match_keys
                    (sync_id, side, collection_id, record_id, key_value, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(sync_id.as_uuid())
            .bind(side.as_str())
            .bind(collection_id)
            .bind(&key.record_id)
            .bind(&key.key_value)
            .bind(position_of(position)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| CacheError::database("insert match key", e))?;
        }
        Ok(())
    }

    async fn replace_id_mappings(
        tx: &mut Transaction<'_, Postgres>,
        sync_id: SyncId,
        collection_id: &str,
        mappings: &[RemoteIdMapping],
    ) -> CacheResult<()> {
        sqlx::query(
            r#"
            DELETE FROM sync_remote_id_mappings
            WHERE sync_id = $1 AND collection_id = $2
            "#,
        )
        .bind(sync_id.as_uuid())
        .bind(collection_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| CacheError::database("delete id mappings", e))?;

        for (position, mapping) in mappings.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sync_remote_id_mappings
                    (sync_id, collection_id, source_record_id, destination_record_id, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(sync_id.as_uuid())
            .bind(collection_id)
            .bind(&mapping.source_record_id)
            .bind(&mapping.destination_record_id)
            .bind(position_of(position)?)
            .execute(&mut **tx)
            .await
            .map_err(|e| CacheError::database("insert id mapping", e))?;
        }
        Ok(())
    }
}

fn position_of(index: usize) -> CacheResult<i32> {
    i32::try_from(index).map_err(|_| CacheError::Corrupt {
        message: format!("row position {index} exceeds the cache limit"),
    })
}

#[async_trait]
impl CacheRepository for PgCacheRepository {
    #[instrument(skip(self))]
    async fn get_match_keys(
        &self,
        sync_id: SyncId,
        side: Side,
        collection_id: &str,
    ) -> CacheResult<Vec<MatchKey>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT record_id, key_value FROM sync_match_keys
            WHERE sync_id = $1 AND side = $2 AND collection_id = $3
            ORDER BY position
            "#,
        )
        .bind(sync_id.as_uuid())
        .bind(side.as_str())
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CacheError::database("load match keys", e))?;

        Ok(rows
            .into_iter()
            .map(|(record_id, key_value)| MatchKey {
                sync_id,
                side,
                collection_id: collection_id.to_string(),
                record_id,
                key_value,
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_id_mappings(
        &self,
        sync_id: SyncId,
        collection_id: &str,
    ) -> CacheResult<Vec<RemoteIdMapping>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT source_record_id, destination_record_id FROM sync_remote_id_mappings
            WHERE sync_id = $1 AND collection_id = $2
            ORDER BY position
            "#,
        )
        .bind(sync_id.as_uuid())
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CacheError::database("load id mappings", e))?;

        Ok(rows
            .into_iter()
            .map(|(source_record_id, destination_record_id)| RemoteIdMapping {
                sync_id,
                collection_id: collection_id.to_string(),
                source_record_id,
                destination_record_id,
            })
            .collect())
    }

    #[instrument(skip(self, caches), fields(
        sync_id = %caches.sync_id,
        source = %caches.source_collection_id,
        destination = %caches.destination_collection_id,
    ))]
    async fn replace_run(&self, caches: RunCaches) -> CacheResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CacheError::database("begin", e))?;

        Self::replace_match_keys(
            &mut tx,
            caches.sync_id,
            Side::Source,
            &caches.source_collection_id,
            &caches.source_match_keys,
        )
        .await?;
        Self::replace_match_keys(
            &mut tx,
            caches.sync_id,
            Side::Destination,
            &caches.destination_collection_id,
            &caches.destination_match_keys,
        )
        .await?;
        Self::replace_id_mappings(
            &mut tx,
            caches.sync_id,
            &caches.source_collection_id,
            &caches.id_mappings,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| CacheError::database("commit", e))?;

        debug!(
            match_keys = caches.source_match_keys.len() + caches.destination_match_keys.len(),
            id_mappings = caches.id_mappings.len(),
            "Replaced run caches"
        );
        Ok(())
    }
}
