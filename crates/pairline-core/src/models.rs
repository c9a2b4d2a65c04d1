//! Participant and session records held by the queue and the registry.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use pairline_shared::constants::{DEFAULT_DISPLAY_NAME, MAX_DISPLAY_NAME_CHARS};
use pairline_shared::protocol::SessionSummary;
use pairline_shared::{CloseReason, ParticipantId, ParticipantState, SessionId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One queued or matched end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// Monotonic admission time; orders the queue.
    pub joined_at: Instant,
    /// Wall-clock admission time, for reporting only.
    pub joined_at_utc: DateTime<Utc>,
    pub state: ParticipantState,
}

impl Participant {
    /// A freshly admitted participant with a generated id.
    pub fn new(display_name: &str) -> Self {
        Self::with_id(ParticipantId::new(), display_name)
    }

    pub fn with_id(id: ParticipantId, display_name: &str) -> Self {
        Self {
            id,
            display_name: normalize_display_name(display_name),
            joined_at: Instant::now(),
            joined_at_utc: Utc::now(),
            state: ParticipantState::Waiting,
        }
    }
}

/// Trim, cap at `MAX_DISPLAY_NAME_CHARS` characters, and fall back to the
/// anonymous name when nothing is left.
pub fn normalize_display_name(raw: &str) -> String {
    let trimmed: String = raw.trim().chars().take(MAX_DISPLAY_NAME_CHARS).collect();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        DEFAULT_DISPLAY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Closed {
        reason: CloseReason,
        closed_at: Instant,
    },
}

/// A pairing result ("room"). Always holds exactly two distinct participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub participants: [Participant; 2],
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }

    /// The other participant, if `participant` is a member.
    pub fn peer_of(&self, participant: &ParticipantId) -> Option<&Participant> {
        let [a, b] = &self.participants;
        if &a.id == participant {
            Some(b)
        } else if &b.id == participant {
            Some(a)
        } else {
            None
        }
    }

    pub fn participant_ids(&self) -> [&ParticipantId; 2] {
        [&self.participants[0].id, &self.participants[1].id]
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            participants: [
                self.participants[0].display_name.clone(),
                self.participants[1].display_name.clone(),
            ],
            created_at: self.created_at,
            away: None,
        }
    }
}
