use crate::models::{Kind, MatchSettings, Mode, Participant, ParticipantId};

/// Score condition a candidate must meet for a given initiator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreRule {
    /// Candidate score must equal `target - initiator.score`
    ExactSum { required: i32 },
    /// `min <= initiator.score + candidate.score <= max`
    SumWithin { initiator_score: i32, min: i32, max: i32 },
}

impl ScoreRule {
    /// Inclusive range of candidate scores the rule accepts
    ///
    /// Empty (`lo > hi`) when the configured band is inverted.
    pub fn candidate_bounds(&self) -> (i32, i32) {
        match *self {
            ScoreRule::ExactSum { required } => (required, required),
            ScoreRule::SumWithin { initiator_score, min, max } => (
                min.saturating_sub(initiator_score),
                max.saturating_sub(initiator_score),
            ),
        }
    }

    #[inline]
    pub fn accepts(&self, candidate_score: i32) -> bool {
        let (lo, hi) = self.candidate_bounds();
        candidate_score >= lo && candidate_score <= hi
    }
}

/// Predicate describing every participant an initiator may be bound to
///
/// Candidates must be of the opposite kind, registered in the same mode,
/// still pending, distinct from the initiator, and satisfy the score rule
/// of the initiator's mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub initiator: ParticipantId,
    pub kind: Kind,
    pub mode: Mode,
    pub rule: ScoreRule,
}

impl CandidateFilter {
    /// Build the filter from the initiator and the rules currently in effect
    pub fn for_initiator(initiator: &Participant, settings: &MatchSettings) -> Self {
        let rule = match initiator.mode {
            Mode::Exact => ScoreRule::ExactSum {
                required: settings.target_score.saturating_sub(initiator.score),
            },
            Mode::Fuzzy => ScoreRule::SumWithin {
                initiator_score: initiator.score,
                min: settings.fuzzy_min,
                max: settings.fuzzy_max,
            },
        };

        Self {
            initiator: initiator.id.clone(),
            kind: initiator.kind.opposite(),
            mode: initiator.mode,
            rule,
        }
    }

    /// Check a single candidate against the filter
    #[inline]
    pub fn accepts(&self, candidate: &Participant) -> bool {
        candidate.id != self.initiator
            && candidate.kind == self.kind
            && candidate.mode == self.mode
            && candidate.is_pending()
            && self.rule.accepts(candidate.score)
    }

    /// Pick the longest-waiting accepted candidate
    ///
    /// Ties on `created_at` fall back to id order.
    pub fn select_oldest<'a, I>(&self, candidates: I) -> Option<&'a Participant>
    where
        I: IntoIterator<Item = &'a Participant>,
    {
        candidates
            .into_iter()
            .filter(|p| self.accepts(p))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
    }
}
