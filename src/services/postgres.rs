use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;

use crate::config::DatabaseSettings;
use crate::core::CandidateFilter;
use crate::models::{
    Kind, MatchState, Mode, NewParticipant, ParseError, Participant, ParticipantId, Status,
};
use crate::services::runtime_config::ConfigProvider;
use crate::services::store::{ParticipantStore, StoreError, StoreResult, StoreTransaction};

/// Columns selected for every participant read; enums come back as text
const PARTICIPANT_COLUMNS: &str = "id, kind::text AS kind, score, mode::text AS mode, \
     content_key, artifact_path, origin, status::text AS status, partner_id, created_at";

/// PostgreSQL-backed participant store and configuration provider
///
/// Row locks are taken with `SELECT ... FOR UPDATE`; every transaction
/// sets a local `lock_timeout` so a blocked attempt fails instead of
/// waiting forever.
#[derive(Clone)]
pub struct PostgresClient {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        lock_timeout_ms: u64,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool, lock_timeout_ms })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            &settings.url,
            settings.max_connections.unwrap_or(10),
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            settings.lock_timeout_ms.unwrap_or(5000),
        )
        .await
    }
}

/// Translate sqlx failures into store errors
///
/// Lock waits, deadlocks and serialization failures abort the transaction
/// and are reported as unavailability so callers may retry.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40P01") | Some("55P03") | Some("40001") => {
                return StoreError::Unavailable(db.message().to_string());
            }
            _ => {}
        }
    }
    StoreError::SqlxError(err)
}

fn participant_from_row(row: &PgRow) -> StoreResult<Participant> {
    let corrupt = |e: ParseError| StoreError::Corrupt(e.to_string());

    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let mode: String = row.try_get("mode")?;
    let status: String = row.try_get("status")?;
    let partner: Option<String> = row.try_get("partner_id")?;

    let id = id.parse::<ParticipantId>().map_err(corrupt)?;
    let partner = partner
        .map(|p| p.parse::<ParticipantId>())
        .transpose()
        .map_err(corrupt)?;
    let status = status.parse::<Status>().map_err(corrupt)?;
    let state = MatchState::from_columns(status, partner).ok_or_else(|| {
        StoreError::Corrupt(format!("participant {} has inconsistent status and partner", id))
    })?;

    Ok(Participant {
        id,
        kind: kind.parse::<Kind>().map_err(corrupt)?,
        score: row.try_get("score")?,
        mode: mode.parse::<Mode>().map_err(corrupt)?,
        content_key: row.try_get("content_key")?,
        artifact_path: row.try_get("artifact_path")?,
        origin: row.try_get("origin")?,
        state,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ParticipantStore for PostgresClient {
    type Tx = PgTransaction;

    async fn create_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        let query = format!(
            r#"
            INSERT INTO participants (id, kind, score, mode, content_key, origin, status)
            VALUES ($1, $2::participant_kind, $3, $4::match_mode, $5, $6, 'pending')
            RETURNING {PARTICIPANT_COLUMNS}
            "#
        );

        let id = ParticipantId::generate();
        let result = sqlx::query(&query)
            .bind(id.as_str())
            .bind(new.kind.as_str())
            .bind(new.score)
            .bind(new.mode.as_str())
            .bind(&new.content_key)
            .bind(&new.origin)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => {
                let participant = participant_from_row(&row)?;
                tracing::debug!(
                    "Created participant {} ({:?}, {:?}, score {})",
                    participant.id,
                    participant.kind,
                    participant.mode,
                    participant.score
                );
                Ok(participant)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateContentKey(new.content_key))
            }
            Err(e) => Err(map_sqlx(e)),
        }
    }

    async fn get(&self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        let query = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(participant_from_row).transpose()
    }

    async fn content_key_exists(&self, content_key: &str) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE content_key = $1) AS present",
        )
        .bind(content_key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.try_get("present")?)
    }

    async fn count_submissions_since(&self, origin: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS submissions
            FROM participants
            WHERE origin = $1 AND created_at >= $2
            "#,
        )
        .bind(origin)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let count: i64 = row.try_get("submissions")?;
        Ok(count.max(0) as u64)
    }

    async fn set_artifact_path(&self, id: &ParticipantId, path: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE participants SET artifact_path = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(path)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("participant {} does not exist", id)));
        }
        Ok(())
    }

    /// Health check for the database connection
    async fn health_check(&self) -> StoreResult<bool> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(map_sqlx)
    }

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let set_timeout = format!("SET LOCAL lock_timeout = {}", self.lock_timeout_ms);
        sqlx::query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        Ok(PgTransaction { tx })
    }
}

/// Open PostgreSQL transaction; rolled back by sqlx when dropped
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_and_read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        let query = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = $1 FOR UPDATE"
        );

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(participant_from_row).transpose()
    }

    async fn read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        let query = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(participant_from_row).transpose()
    }

    async fn find_oldest_compatible(
        &mut self,
        filter: &CandidateFilter,
    ) -> StoreResult<Option<Participant>> {
        let (min_score, max_score) = filter.rule.candidate_bounds();
        if min_score > max_score {
            return Ok(None);
        }

        // A row claimed by a concurrent attempt is re-checked after its lock
        // is released and dropped if it is no longer pending.
        let query = format!(
            r#"
            SELECT {PARTICIPANT_COLUMNS}
            FROM participants
            WHERE kind = $1::participant_kind
              AND mode = $2::match_mode
              AND status = 'pending'
              AND id <> $3
              AND score BETWEEN $4 AND $5
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE
            "#
        );

        let row = sqlx::query(&query)
            .bind(filter.kind.as_str())
            .bind(filter.mode.as_str())
            .bind(filter.initiator.as_str())
            .bind(min_score)
            .bind(max_score)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(participant_from_row).transpose()
    }

    async fn update_status_and_partner(
        &mut self,
        id: &ParticipantId,
        partner: &ParticipantId,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE participants
            SET status = 'matched', partner_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_str())
        .bind(partner.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::WriteConflict(id.clone()));
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}

#[async_trait]
impl ConfigProvider for PostgresClient {
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM app_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(row.map(|r| r.try_get("value")).transpose()?)
    }

    async fn set_value(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_config (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        tracing::info!("Runtime configuration {} set to {}", key, value);
        Ok(())
    }

    async fn seed_value(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO app_config (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }
}
