use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::compat::CandidateFilter;
use crate::models::{MatchInfo, MatchOutcome, MatchSettings, MatchState, ParticipantId, StatusReport};
use crate::services::runtime_config::ConfigProvider;
use crate::services::store::{ParticipantStore, StoreError, StoreTransaction};

/// Errors surfaced by the matching engine
#[derive(Debug, Error)]
pub enum MatchError {
    /// The participant (or the partner a matched participant points to)
    /// does not exist
    #[error("Participant not found: {0}")]
    NotFound(ParticipantId),

    /// Transaction infrastructure failed; the attempt left no trace and may
    /// be retried
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Pairs pending participants with compatible partners
///
/// All mutation happens inside one store transaction: the initiator row is
/// locked first, then the chosen candidate row, and both sides are bound
/// before a single commit. Concurrent attempts racing for the same
/// candidate are serialized by that candidate's row lock.
pub struct MatchingEngine<S: ParticipantStore> {
    store: Arc<S>,
    config: Arc<dyn ConfigProvider>,
}

impl<S: ParticipantStore> Clone for MatchingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: ParticipantStore> MatchingEngine<S> {
    pub fn new(store: Arc<S>, config: Arc<dyn ConfigProvider>) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Try to bind `id` to a compatible partner
    ///
    /// Safe to call repeatedly: a participant that is already matched
    /// short-circuits to [`MatchOutcome::AlreadyMatched`] with the same
    /// partner every time. Any error rolls the transaction back.
    pub async fn attempt(&self, id: &ParticipantId) -> Result<MatchOutcome, MatchError> {
        let mut tx = self.store.begin().await?;

        let target = tx
            .lock_and_read(id)
            .await?
            .ok_or_else(|| MatchError::NotFound(id.clone()))?;

        if let MatchState::Matched { partner } = &target.state {
            let partner = tx
                .read(partner)
                .await?
                .ok_or_else(|| MatchError::NotFound(partner.clone()))?;
            tx.commit().await?;
            return Ok(MatchOutcome::AlreadyMatched(MatchInfo::from(&partner)));
        }

        let settings = MatchSettings::read(self.config.as_ref()).await?;
        if settings.fuzzy_min > settings.fuzzy_max {
            warn!(
                "Fuzzy band is inverted ({} > {}), fuzzy participants cannot match",
                settings.fuzzy_min, settings.fuzzy_max
            );
        }

        let filter = CandidateFilter::for_initiator(&target, &settings);
        debug!(
            "Searching candidates for {}: kind={:?} mode={:?} rule={:?}",
            target.id, filter.kind, filter.mode, filter.rule
        );

        let Some(candidate) = tx.find_oldest_compatible(&filter).await? else {
            debug!("No candidate for {}", target.id);
            return Ok(MatchOutcome::NoCandidate);
        };

        tx.update_status_and_partner(&target.id, &candidate.id).await?;
        tx.update_status_and_partner(&candidate.id, &target.id).await?;
        tx.commit().await?;

        info!(
            "Matched {} ({:?}, {}) with {} ({:?}, {})",
            target.id, target.kind, target.score, candidate.id, candidate.kind, candidate.score
        );

        Ok(MatchOutcome::NewlyMatched(MatchInfo::from(&candidate)))
    }

    /// Report a participant's state without attempting a match
    ///
    /// Never mutates anything.
    pub async fn status(&self, id: &ParticipantId) -> Result<StatusReport, MatchError> {
        let participant = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MatchError::NotFound(id.clone()))?;

        match &participant.state {
            MatchState::Pending => Ok(StatusReport::Pending),
            MatchState::Matched { partner } => {
                let partner = self
                    .store
                    .get(partner)
                    .await?
                    .ok_or_else(|| MatchError::NotFound(partner.clone()))?;
                Ok(StatusReport::Matched(MatchInfo::from(&partner)))
            }
        }
    }
}
