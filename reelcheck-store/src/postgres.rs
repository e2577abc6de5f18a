//! PostgreSQL implementation of the fingerprint store and incident ledger.
//!
//! Every decide-and-write step runs in one database transaction that first
//! takes a transaction-scoped advisory lock, so submissions are serialized
//! across every process sharing the database. Dropping a [`PgTransaction`]
//! without committing rolls it back.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use reelcheck_core::index::MAX_INDEXED_DISTANCE;
use reelcheck_core::{
    FingerprintSet, FrameHash, FrameMatch, IncidentRecord, IncidentStore, Result,
    StoredFrame, StoreTransaction,
};

use crate::PgStoreError;

/// Advisory lock key shared by every resolution transaction.
const RESOLUTION_LOCK_KEY: i64 = 0x7265_656c_6368_6b00;

/// Distance query restricted to rows sharing at least one 8-bit band with
/// the query hash. Exhaustive for distances up to 7.
const FIND_BANDED_SQL: &str = r#"
    SELECT source_id, timestamp_seconds, phash,
           bit_count((phash # $1)::bit(64))::int4 AS distance
    FROM video_frames
    WHERE ((phash & 255) = ($1 & 255)
        OR ((phash >> 8) & 255) = (($1 >> 8) & 255)
        OR ((phash >> 16) & 255) = (($1 >> 16) & 255)
        OR ((phash >> 24) & 255) = (($1 >> 24) & 255)
        OR ((phash >> 32) & 255) = (($1 >> 32) & 255)
        OR ((phash >> 40) & 255) = (($1 >> 40) & 255)
        OR ((phash >> 48) & 255) = (($1 >> 48) & 255)
        OR ((phash >> 56) & 255) = (($1 >> 56) & 255))
      AND bit_count((phash # $1)::bit(64)) <= $2
    ORDER BY distance, source_id, timestamp_seconds
    LIMIT $3
"#;

const FIND_SCAN_SQL: &str = r#"
    SELECT source_id, timestamp_seconds, phash,
           bit_count((phash # $1)::bit(64))::int4 AS distance
    FROM video_frames
    WHERE bit_count((phash # $1)::bit(64)) <= $2
    ORDER BY distance, source_id, timestamp_seconds
    LIMIT $3
"#;

/// PostgreSQL-backed [`IncidentStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Row type for distance queries.
#[derive(FromRow)]
struct FrameRow {
    source_id: String,
    timestamp_seconds: f64,
    phash: i64,
    distance: i32,
}

impl From<FrameRow> for FrameMatch {
    fn from(row: FrameRow) -> Self {
        Self {
            frame: StoredFrame {
                source_id: row.source_id,
                timestamp_seconds: row.timestamp_seconds,
                hash: hash_from_db(row.phash),
            },
            distance: row.distance.unsigned_abs(),
        }
    }
}

#[derive(FromRow)]
struct IncidentRow {
    canonical_id: String,
    resubmission_count: i32,
    created_at: DateTime<Utc>,
}

impl PgStore {
    /// Connect to `database_url` and apply pending migrations.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> std::result::Result<Self, PgStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| PgStoreError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(max_connections, "Fingerprint store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Count stored frame rows.
    pub async fn frame_count(&self) -> std::result::Result<i64, PgStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_frames")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl IncidentStore for PgStore {
    type Tx<'a> = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx<'_>> {
        let mut tx = self.pool.begin().await.map_err(PgStoreError::from)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(RESOLUTION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(PgStoreError::from)?;
        Ok(PgTransaction { tx })
    }

    async fn incident(&self, source_id: &str) -> Result<Option<IncidentRecord>> {
        let mut conn = self.pool.acquire().await.map_err(PgStoreError::from)?;
        let Some(canonical_id) = resolve_on(&mut conn, source_id).await? else {
            return Ok(None);
        };
        Ok(load_incident(&mut conn, &canonical_id).await?)
    }

    async fn find_within(
        &self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>> {
        let mut conn = self.pool.acquire().await.map_err(PgStoreError::from)?;
        Ok(find_within_on(&mut conn, hash, max_distance, limit).await?)
    }

    async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PgStoreError::from)?;
        Ok(())
    }
}

/// One serialized database transaction.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn has_fingerprints(&mut self, source_id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM fingerprinted_sources WHERE source_id = $1)",
        )
        .bind(source_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;
        Ok(exists)
    }

    async fn find_within(
        &mut self,
        hash: FrameHash,
        max_distance: u32,
        limit: usize,
    ) -> Result<Vec<FrameMatch>> {
        Ok(find_within_on(&mut self.tx, hash, max_distance, limit).await?)
    }

    async fn insert_fingerprints(
        &mut self,
        source_id: &str,
        set: &FingerprintSet,
    ) -> Result<usize> {
        let frame_count = i32::try_from(set.len())
            .map_err(|_| PgStoreError::Invariant(format!("{} frames is too many", set.len())))?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO fingerprinted_sources (source_id, frame_count)
            VALUES ($1, $2)
            ON CONFLICT (source_id) DO NOTHING
            "#,
        )
        .bind(source_id)
        .bind(frame_count)
        .execute(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;

        if claimed.rows_affected() == 0 {
            return Err(PgStoreError::Invariant(format!(
                "fingerprints for {source_id} already written"
            ))
            .into());
        }

        let timestamps: Vec<f64> = set.iter().map(|f| f.timestamp_seconds).collect();
        let hashes: Vec<i64> = set.iter().map(|f| hash_to_db(f.hash)).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO video_frames (source_id, timestamp_seconds, phash)
            SELECT $1, t, h FROM UNNEST($2::float8[], $3::int8[]) AS u(t, h)
            "#,
        )
        .bind(source_id)
        .bind(timestamps)
        .bind(hashes)
        .execute(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;

        tracing::debug!(source_id, frames = inserted.rows_affected(), "Stored fingerprints");
        Ok(set.len())
    }

    async fn resolve(&mut self, source_id: &str) -> Result<Option<String>> {
        Ok(resolve_on(&mut self.tx, source_id).await?)
    }

    async fn incident(&mut self, canonical_id: &str) -> Result<Option<IncidentRecord>> {
        Ok(load_incident(&mut self.tx, canonical_id).await?)
    }

    async fn increment(&mut self, canonical_id: &str) -> Result<u32> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE incident_records
            SET resubmission_count = resubmission_count + 1
            WHERE canonical_id = $1
            RETURNING resubmission_count
            "#,
        )
        .bind(canonical_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;

        let count = count.ok_or_else(|| {
            PgStoreError::Invariant(format!("no incident with canonical id {canonical_id}"))
        })?;
        Ok(count.unsigned_abs())
    }

    async fn create_canonical(&mut self, source_id: &str) -> Result<IncidentRecord> {
        if let Some(canonical) = resolve_on(&mut self.tx, source_id).await? {
            return Err(PgStoreError::Invariant(format!(
                "{source_id} already belongs to incident {canonical}"
            ))
            .into());
        }

        let created_at: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO incident_records (canonical_id) VALUES ($1) RETURNING created_at",
        )
        .bind(source_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;

        Ok(IncidentRecord::new(source_id, created_at))
    }

    async fn add_alias(&mut self, canonical_id: &str, alias_id: &str) -> Result<()> {
        if let Some(canonical) = resolve_on(&mut self.tx, alias_id).await? {
            return Err(PgStoreError::Invariant(format!(
                "{alias_id} already belongs to incident {canonical}"
            ))
            .into());
        }

        let linked = sqlx::query(
            r#"
            INSERT INTO incident_aliases (alias_id, canonical_id)
            SELECT $1, canonical_id FROM incident_records WHERE canonical_id = $2
            "#,
        )
        .bind(alias_id)
        .bind(canonical_id)
        .execute(&mut *self.tx)
        .await
        .map_err(PgStoreError::from)?;

        if linked.rows_affected() == 0 {
            return Err(PgStoreError::Invariant(format!(
                "no incident with canonical id {canonical_id}"
            ))
            .into());
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(PgStoreError::from)?;
        Ok(())
    }
}

async fn find_within_on(
    conn: &mut PgConnection,
    hash: FrameHash,
    max_distance: u32,
    limit: usize,
) -> std::result::Result<Vec<FrameMatch>, PgStoreError> {
    let sql = if max_distance <= MAX_INDEXED_DISTANCE {
        FIND_BANDED_SQL
    } else {
        FIND_SCAN_SQL
    };
    let rows: Vec<FrameRow> = sqlx::query_as(sql)
        .bind(hash_to_db(hash))
        .bind(i64::from(max_distance))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(conn)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn resolve_on(
    conn: &mut PgConnection,
    source_id: &str,
) -> std::result::Result<Option<String>, PgStoreError> {
    let canonical: Option<String> = sqlx::query_scalar(
        r#"
        SELECT canonical_id FROM incident_records WHERE canonical_id = $1
        UNION ALL
        SELECT canonical_id FROM incident_aliases WHERE alias_id = $1
        LIMIT 1
        "#,
    )
    .bind(source_id)
    .fetch_optional(conn)
    .await?;
    Ok(canonical)
}

async fn load_incident(
    conn: &mut PgConnection,
    canonical_id: &str,
) -> std::result::Result<Option<IncidentRecord>, PgStoreError> {
    let row: Option<IncidentRow> = sqlx::query_as(
        r#"
        SELECT canonical_id, resubmission_count, created_at
        FROM incident_records
        WHERE canonical_id = $1
        "#,
    )
    .bind(canonical_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let aliases: Vec<String> = sqlx::query_scalar(
        "SELECT alias_id FROM incident_aliases WHERE canonical_id = $1 ORDER BY alias_id",
    )
    .bind(canonical_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(IncidentRecord {
        canonical_id: row.canonical_id,
        resubmission_count: row.resubmission_count.unsigned_abs(),
        known_alias_ids: aliases.into_iter().collect::<BTreeSet<_>>(),
        created_at: row.created_at,
    }))
}

/// Store the hash bit pattern in a signed BIGINT column.
fn hash_to_db(hash: FrameHash) -> i64 {
    i64::from_be_bytes(hash.to_bytes())
}

fn hash_from_db(value: i64) -> FrameHash {
    FrameHash::from_bytes(value.to_be_bytes())
}
