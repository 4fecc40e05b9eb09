// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    Kind, MatchInfo, MatchOutcome, MatchSettings, MatchState, Mode, NewParticipant, ParseError,
    Participant, ParticipantId, Status, StatusReport,
};
pub use requests::RegisterRequest;
pub use responses::{ErrorResponse, HealthResponse, RegisterResponse, StatusResponse};
