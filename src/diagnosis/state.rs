//! Diagnosis state machine — tracks where each user is in the battery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The phases of a diagnosis pass.
///
/// A user with no stored session is implicitly in the "absent" phase; the
/// engine creates a session on their first message. The step of the active
/// question list travels with the phase so a step can never point into the
/// wrong list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Choice { step: usize },
    FreeText { step: usize },
    Done { tier: u32 },
}

impl Phase {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Choice { .. } => "choice",
            Self::FreeText { .. } => "free_text",
            Self::Done { .. } => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Choice { step } | Self::FreeText { step } => {
                write!(f, "{}[{}]", self.name(), step)
            }
            Self::Done { tier } => write!(f, "done(tier {tier})"),
        }
    }
}

/// Per-user diagnosis state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub phase: Phase,
    /// Sum of accepted multiple-choice answers.
    pub choice_score: u32,
    /// Sum of classifier ratings for free-text answers.
    pub free_text_score: u32,
    /// Set when a single-pass diagnosis has been finished; no retake allowed.
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session starting in `phase`.
    pub fn new(phase: Phase) -> Self {
        let now = Utc::now();
        Self {
            phase,
            choice_score: 0,
            free_text_score: 0,
            completed: false,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn total_score(&self) -> u32 {
        self.choice_score + self.free_text_score
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Phase::Choice { step: 1 }.to_string(), "choice[1]");
        assert_eq!(Phase::Done { tier: 7 }.to_string(), "done(tier 7)");
    }

    #[test]
    fn new_session_starts_empty() {
        let session = Session::new(Phase::FreeText { step: 0 });
        assert_eq!(session.total_score(), 0);
        assert!(!session.completed);
        assert_eq!(session.created_at, session.last_activity_at);
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new(Phase::Choice { step: 3 });
        session.choice_score = 9;
        session.free_text_score = 4;

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["phase"], "choice");
        assert_eq!(json["step"], 3);

        let parsed: Session = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, session);
        assert_eq!(parsed.total_score(), 13);
    }
}
