//! Zufen - score-based pairing service
//!
//! Participants (teams or individuals) register with a score and a matching
//! mode; the matching engine binds each one to at most one participant of
//! the opposite kind whose score complements it, using row-locking store
//! transactions so concurrent attempts never claim the same partner twice.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{CandidateFilter, MatchError, MatchingEngine};
pub use models::{Kind, MatchInfo, MatchOutcome, MatchSettings, Mode, Participant, ParticipantId, StatusReport};
