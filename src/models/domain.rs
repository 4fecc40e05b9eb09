use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing one of the closed domain values from text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid participant id: {0}")]
    ParticipantId(String),

    #[error("Invalid participant kind: {0}")]
    Kind(String),

    #[error("Invalid match mode: {0}")]
    Mode(String),

    #[error("Invalid participant status: {0}")]
    Status(String),
}

/// Opaque participant identifier
///
/// Rendered as four groups of four lowercase hex digits
/// (`xxxx-xxxx-xxxx-xxxx`), taken from a random v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}-{}-{}",
            &hex[0..4],
            &hex[4..8],
            &hex[8..12],
            &hex[12..16]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ParticipantId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = s.split('-').collect();
        let well_formed = groups.len() == 4
            && groups.iter().all(|g| {
                g.len() == 4 && g.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            });

        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(ParseError::ParticipantId(s.to_string()))
        }
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the pairing a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Team,
    Person,
}

impl Kind {
    /// Matching only ever pairs a team with a person
    pub fn opposite(self) -> Self {
        match self {
            Kind::Team => Kind::Person,
            Kind::Person => Kind::Team,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Team => "team",
            Kind::Person => "person",
        }
    }
}

impl FromStr for Kind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "team" => Ok(Kind::Team),
            "person" => Ok(Kind::Person),
            other => Err(ParseError::Kind(other.to_string())),
        }
    }
}

/// Compatibility rule a participant applies when it initiates a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Scores must sum exactly to the target
    Exact,
    /// Scores must sum into the configured inclusive band
    Fuzzy,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Exact => "exact",
            Mode::Fuzzy => "fuzzy",
        }
    }
}

impl FromStr for Mode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Mode::Exact),
            "fuzzy" => Ok(Mode::Fuzzy),
            other => Err(ParseError::Mode(other.to_string())),
        }
    }
}

/// Persisted lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Matched,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Matched => "matched",
        }
    }
}

impl FromStr for Status {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "matched" => Ok(Status::Matched),
            other => Err(ParseError::Status(other.to_string())),
        }
    }
}

/// Status and partner folded together: a matched participant always
/// carries its partner, a pending one never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchState {
    Pending,
    Matched { partner: ParticipantId },
}

impl MatchState {
    /// Rebuild the state from its two stored columns
    ///
    /// Returns `None` when the columns disagree (matched without a partner,
    /// or a partner recorded on a pending row).
    pub fn from_columns(status: Status, partner: Option<ParticipantId>) -> Option<Self> {
        match (status, partner) {
            (Status::Pending, None) => Some(MatchState::Pending),
            (Status::Matched, Some(partner)) => Some(MatchState::Matched { partner }),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            MatchState::Pending => Status::Pending,
            MatchState::Matched { .. } => Status::Matched,
        }
    }

    pub fn partner(&self) -> Option<&ParticipantId> {
        match self {
            MatchState::Pending => None,
            MatchState::Matched { partner } => Some(partner),
        }
    }
}

/// A registrant waiting for, or bound to, a partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub kind: Kind,
    pub score: i32,
    pub mode: Mode,
    /// Decoded QR content, unique across all participants
    pub content_key: String,
    /// Public path of the stored QR image, set once the upload is saved
    pub artifact_path: Option<String>,
    /// Submission source, used only for quota accounting
    pub origin: String,
    pub state: MatchState,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, MatchState::Pending)
    }
}

/// Fields supplied by the gateway when creating a participant
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub kind: Kind,
    pub score: i32,
    pub mode: Mode,
    pub content_key: String,
    pub origin: String,
}

/// What a caller learns about its partner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    #[serde(skip)]
    pub partner_id: Option<ParticipantId>,
    pub score: i32,
    #[serde(rename = "qrcode_path")]
    pub artifact_path: Option<String>,
}

impl From<&Participant> for MatchInfo {
    fn from(partner: &Participant) -> Self {
        Self {
            partner_id: Some(partner.id.clone()),
            score: partner.score,
            artifact_path: partner.artifact_path.clone(),
        }
    }
}

/// Result of a matching attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The participant was bound before this call
    AlreadyMatched(MatchInfo),
    /// This call performed the binding
    NewlyMatched(MatchInfo),
    /// No compatible pending participant exists yet
    NoCandidate,
}

impl MatchOutcome {
    pub fn match_info(&self) -> Option<&MatchInfo> {
        match self {
            MatchOutcome::AlreadyMatched(info) | MatchOutcome::NewlyMatched(info) => Some(info),
            MatchOutcome::NoCandidate => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            MatchOutcome::NoCandidate => Status::Pending,
            _ => Status::Matched,
        }
    }
}

/// Result of a pure status read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Pending,
    Matched(MatchInfo),
}

impl StatusReport {
    pub fn status(&self) -> Status {
        match self {
            StatusReport::Pending => Status::Pending,
            StatusReport::Matched(_) => Status::Matched,
        }
    }

    pub fn match_info(&self) -> Option<&MatchInfo> {
        match self {
            StatusReport::Pending => None,
            StatusReport::Matched(info) => Some(info),
        }
    }
}

/// Score rules in effect for one matching attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    pub target_score: i32,
    pub fuzzy_min: i32,
    pub fuzzy_max: i32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            target_score: 2026,
            fuzzy_min: 2024,
            fuzzy_max: 2028,
        }
    }
}
