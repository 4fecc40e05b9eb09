//! In-memory participant store
//!
//! Every transaction holds the table lock for its whole lifetime, so
//! transactions are fully serialized. Writes are staged and only applied
//! on commit; dropping a transaction discards them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::core::CandidateFilter;
use crate::models::{MatchState, NewParticipant, Participant, ParticipantId};
use crate::services::store::{ParticipantStore, StoreError, StoreResult, StoreTransaction};

#[derive(Debug, Default)]
struct Table {
    rows: HashMap<ParticipantId, Participant>,
    last_created: Option<DateTime<Utc>>,
}

impl Table {
    /// Creation timestamps are kept strictly increasing
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(created);
        created
    }
}

/// Participant store kept entirely in process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    table: Arc<Mutex<Table>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with [`StoreError::Unavailable`]
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Snapshot of every stored participant
    pub async fn all(&self) -> Vec<Participant> {
        self.table.lock().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl ParticipantStore for InMemoryStore {
    type Tx = MemoryTransaction;

    async fn create_participant(&self, new: NewParticipant) -> StoreResult<Participant> {
        let mut table = self.table.lock().await;

        if table.rows.values().any(|p| p.content_key == new.content_key) {
            return Err(StoreError::DuplicateContentKey(new.content_key));
        }

        let participant = Participant {
            id: ParticipantId::generate(),
            kind: new.kind,
            score: new.score,
            mode: new.mode,
            content_key: new.content_key,
            artifact_path: None,
            origin: new.origin,
            state: MatchState::Pending,
            created_at: table.next_created_at(),
        };
        table.rows.insert(participant.id.clone(), participant.clone());

        debug!("Created participant {} ({:?}, {})", participant.id, participant.kind, participant.score);
        Ok(participant)
    }

    async fn get(&self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        Ok(self.table.lock().await.rows.get(id).cloned())
    }

    async fn content_key_exists(&self, content_key: &str) -> StoreResult<bool> {
        let table = self.table.lock().await;
        Ok(table.rows.values().any(|p| p.content_key == content_key))
    }

    async fn count_submissions_since(&self, origin: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .filter(|p| p.origin == origin && p.created_at >= since)
            .count() as u64)
    }

    async fn set_artifact_path(&self, id: &ParticipantId, path: &str) -> StoreResult<()> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(id) {
            Some(p) => {
                p.artifact_path = Some(path.to_string());
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!("participant {} does not exist", id))),
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    async fn begin(&self) -> StoreResult<MemoryTransaction> {
        let guard = self.table.clone().lock_owned().await;
        Ok(MemoryTransaction {
            guard,
            staged: HashMap::new(),
            fail_next_commit: self.fail_next_commit.clone(),
        })
    }
}

/// Transaction over [`InMemoryStore`]
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Table>,
    staged: HashMap<ParticipantId, ParticipantId>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryTransaction {
    /// Row as seen from inside this transaction
    fn view(&self, id: &ParticipantId) -> Option<Participant> {
        let mut participant = self.guard.rows.get(id)?.clone();
        if let Some(partner) = self.staged.get(id) {
            participant.state = MatchState::Matched { partner: partner.clone() };
        }
        Some(participant)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_and_read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        Ok(self.view(id))
    }

    async fn read(&mut self, id: &ParticipantId) -> StoreResult<Option<Participant>> {
        Ok(self.view(id))
    }

    async fn find_oldest_compatible(
        &mut self,
        filter: &CandidateFilter,
    ) -> StoreResult<Option<Participant>> {
        let views: Vec<Participant> = self
            .guard
            .rows
            .keys()
            .filter_map(|id| self.view(id))
            .collect();
        Ok(filter.select_oldest(&views).cloned())
    }

    async fn update_status_and_partner(
        &mut self,
        id: &ParticipantId,
        partner: &ParticipantId,
    ) -> StoreResult<()> {
        match self.view(id) {
            Some(p) if p.is_pending() => {
                self.staged.insert(id.clone(), partner.clone());
                Ok(())
            }
            Some(_) => Err(StoreError::WriteConflict(id.clone())),
            None => Err(StoreError::Corrupt(format!("participant {} does not exist", id))),
        }
    }

    async fn commit(mut self) -> StoreResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        let staged = std::mem::take(&mut self.staged);
        for (id, partner) in staged {
            if let Some(row) = self.guard.rows.get_mut(&id) {
                row.state = MatchState::Matched { partner };
            }
        }
        Ok(())
    }
}
