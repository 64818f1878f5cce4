//! Hash record repository: upsert-if-absent, skip-locked claiming, and the
//! staging-table bulk load used by filesystem scans.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vfs_core::{
    BulkLoadStats, ClaimedBatch, Error, HashIndexUpdate, HashRecord, HashRepository,
    NewHashRecord, Result, ScanEntry,
};

/// Flush the COPY buffer once it grows past this many bytes.
const COPY_CHUNK_BYTES: usize = 64 * 1024;

const HASH_COLUMNS: &str =
    "hash, namespace, extension, file_size, width, height, blurhash, created_at, indexed_at, error";

/// PostgreSQL implementation of HashRepository.
#[derive(Clone)]
pub struct PgHashRepository {
    pool: PgPool,
}

impl PgHashRepository {
    /// Create a new PgHashRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: PgRow) -> HashRecord {
        HashRecord {
            hash: row.get("hash"),
            namespace: row.get("namespace"),
            extension: row.get("extension"),
            file_size: row.get("file_size"),
            width: row.get("width"),
            height: row.get("height"),
            blurhash: row.get("blurhash"),
            created_at: row.get("created_at"),
            indexed_at: row.get("indexed_at"),
            error: row.get("error"),
        }
    }

    async fn upsert_staged(tx: &mut Transaction<'static, Postgres>) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO vfs_hashes (hash, namespace, file_size, extension)
             SELECT hash,
                    COALESCE(NULLIF(namespace, ''), 'default'),
                    COALESCE(file_size, 0),
                    COALESCE(NULLIF(extension, ''), 'jpg')
             FROM tmp_vfs_hashes
             ON CONFLICT (hash, namespace) DO NOTHING",
        )
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HashRepository for PgHashRepository {
    async fn insert_if_absent(&self, record: NewHashRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO vfs_hashes (hash, namespace, extension, file_size)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (hash, namespace) DO NOTHING",
        )
        .bind(&record.hash)
        .bind(&record.namespace)
        .bind(&record.extension)
        .bind(record.file_size)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, hash: &str, namespace: &str) -> Result<Option<HashRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {HASH_COLUMNS} FROM vfs_hashes WHERE hash = $1 AND namespace = $2"
        ))
        .bind(hash)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn delete(&self, hash: &str, namespace: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vfs_hashes WHERE hash = $1 AND namespace = $2")
            .bind(hash)
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_unindexed(&self, limit: i64) -> Result<Box<dyn ClaimedBatch>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Rows locked by another open batch are skipped, not waited on.
        let rows = sqlx::query(&format!(
            "SELECT {HASH_COLUMNS} FROM vfs_hashes
             WHERE indexed_at IS NULL
             ORDER BY created_at
             LIMIT $1
             FOR NO KEY UPDATE SKIP LOCKED"
        ))
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let records: Vec<HashRecord> = rows.into_iter().map(Self::parse_row).collect();
        debug!(
            subsystem = "db",
            component = "hashes",
            op = "claim",
            rows = records.len(),
            "Claimed unindexed batch"
        );

        Ok(Box::new(PgClaimedBatch { tx, records }))
    }

    async fn bulk_load(
        &self,
        mut entries: mpsc::Receiver<Result<ScanEntry>>,
    ) -> Result<BulkLoadStats> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "CREATE TEMP TABLE tmp_vfs_hashes (
                 hash      VARCHAR(40) NOT NULL,
                 namespace VARCHAR(32),
                 file_size BIGINT,
                 extension VARCHAR(4)
             ) ON COMMIT DROP",
        )
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let mut copy = tx
            .copy_in_raw(
                "COPY tmp_vfs_hashes (hash, namespace, file_size, extension) \
                 FROM STDIN WITH (FORMAT csv, DELIMITER ';')",
            )
            .await
            .map_err(Error::Database)?;

        let mut buf: Vec<u8> = Vec::with_capacity(COPY_CHUNK_BYTES);
        let mut streamed: u64 = 0;

        while let Some(entry) = entries.recv().await {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        subsystem = "db",
                        component = "hashes",
                        op = "bulk_load",
                        error = %e,
                        "Scan producer failed, aborting copy"
                    );
                    // The producer's error is the one returned; abort's own result is moot.
                    let _ = copy.abort(e.to_string()).await;
                    return Err(e);
                }
            };

            buf.extend_from_slice(entry.to_record_line().as_bytes());
            streamed += 1;

            if buf.len() >= COPY_CHUNK_BYTES {
                if let Err(e) = copy.send(std::mem::take(&mut buf)).await {
                    // Dropping the receiver fails the producer's next send.
                    drop(entries);
                    return Err(Error::Database(e));
                }
            }
        }

        if !buf.is_empty() {
            copy.send(buf).await.map_err(Error::Database)?;
        }
        let copied = copy.finish().await.map_err(Error::Database)?;

        let start = Instant::now();
        let added = Self::upsert_staged(&mut tx).await?;
        let upsert_duration = start.elapsed();

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "hashes",
            op = "bulk_load",
            streamed,
            copied,
            added,
            duration_ms = upsert_duration.as_millis() as u64,
            "Bulk load committed"
        );

        Ok(BulkLoadStats {
            scanned: copied,
            added,
            upsert_duration,
        })
    }
}

/// Rows locked by an open transaction until `commit`.
pub struct PgClaimedBatch {
    tx: Transaction<'static, Postgres>,
    records: Vec<HashRecord>,
}

#[async_trait]
impl ClaimedBatch for PgClaimedBatch {
    fn records(&self) -> &[HashRecord] {
        &self.records
    }

    async fn commit(self: Box<Self>, updates: Vec<HashIndexUpdate>) -> Result<()> {
        let PgClaimedBatch { mut tx, .. } = *self;

        if !updates.is_empty() {
            let len = updates.len();
            let mut hashes = Vec::with_capacity(len);
            let mut namespaces = Vec::with_capacity(len);
            let mut widths = Vec::with_capacity(len);
            let mut heights = Vec::with_capacity(len);
            let mut blurhashes: Vec<Option<String>> = Vec::with_capacity(len);
            let mut indexed: Vec<Option<chrono::DateTime<chrono::Utc>>> = Vec::with_capacity(len);
            let mut errors = Vec::with_capacity(len);

            for u in updates {
                hashes.push(u.hash);
                namespaces.push(u.namespace);
                widths.push(u.width);
                heights.push(u.height);
                blurhashes.push(u.blurhash);
                indexed.push(u.indexed_at);
                errors.push(u.error);
            }

            sqlx::query(
                "UPDATE vfs_hashes AS h
                 SET width = u.width,
                     height = u.height,
                     blurhash = u.blurhash,
                     indexed_at = u.indexed_at,
                     error = u.error
                 FROM UNNEST($1::text[], $2::text[], $3::int4[], $4::int4[],
                             $5::text[], $6::timestamptz[], $7::text[])
                      AS u(hash, namespace, width, height, blurhash, indexed_at, error)
                 WHERE h.hash = u.hash AND h.namespace = u.namespace",
            )
            .bind(&hashes)
            .bind(&namespaces)
            .bind(&widths)
            .bind(&heights)
            .bind(&blurhashes)
            .bind(&indexed)
            .bind(&errors)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }
}
