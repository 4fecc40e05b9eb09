use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::CandidateFilter;
use crate::models::{NewParticipant, Participant, ParticipantId};

/// Errors that can occur when interacting with the participant store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate content key: {0}")]
    DuplicateContentKey(String),

    /// A write-once update hit a row that was no longer pending
    #[error("Participant {0} is no longer pending")]
    WriteConflict(ParticipantId),

    #[error("Corrupt participant row: {0}")]
    Corrupt(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::SqlxError(_) | StoreError::Unavailable(_) | StoreError::WriteConflict(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable participant table
///
/// Implementations provide row-level pessimistic locking through
/// [`StoreTransaction`]; plain methods on the store run outside any
/// transaction.
#[async_trait]
pub trait ParticipantStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    /// Insert a pending participant, assigning its id and creation time
    ///
    /// Fails with [`StoreError::DuplicateContentKey`] when the content key
    /// is already taken.
    async fn create_participant(&self, new: NewParticipant) -> StoreResult<Participant>;

    /// Unlocked read
    async fn get(&self, id: &ParticipantId) -> StoreResult<Option<Participant>>;

    async fn content_key_exists(&self, content_key: &str) -> StoreResult<bool>;

    /// Number of participants created by `origin` at or after `since`
    async fn count_submissions_since(&self, origin: &str, since: DateTime<Utc>) -> StoreResult<u64>;

    async fn set_artifact_path(&self, id: &ParticipantId, path: &str) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<bool>;

    /// Open a transaction; dropping it without [`StoreTransaction::commit`]
    /// rolls it back.
    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One all-or-nothing unit of work against the participant table
#[async_trait]
pub trait StoreTransaction: Send + Sized {
    /// Read a participant and hold an exclusive lock on its row until the
    /// transaction ends
    async fn lock_and_read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>>;

    /// Read without taking a row lock
    async fn read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>>;

    /// Find and lock the oldest participant accepted by `filter`
    async fn find_oldest_compatible(
        &mut self,
        filter: &CandidateFilter,
    ) -> StoreResult<Option<Participant>>;

    /// Mark a pending participant as matched to `partner`
    ///
    /// Fails with [`StoreError::WriteConflict`] if the row is not pending.
    async fn update_status_and_partner(
        &mut self,
        id: &ParticipantId,
        partner: &ParticipantId,
    ) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;
}
