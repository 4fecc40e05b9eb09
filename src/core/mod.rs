// Core algorithm exports
pub mod compat;
pub mod matcher;

pub use compat::{CandidateFilter, ScoreRule};
pub use matcher::{MatchError, MatchingEngine};
