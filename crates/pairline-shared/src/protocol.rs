use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CloseReason, MessageId, ParticipantId, SessionId};

/// Events pushed to a single participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The participant was paired and should move to the session
    Matched(MatchedNotice),

    /// The other participant of the session left or timed out
    PeerLeft(PeerLeftNotice),
}

impl Notification {
    /// Event name used by the server-sent events stream.
    pub fn event_name(&self) -> &'static str {
        match self {
            Notification::Matched(_) => "matched",
            Notification::PeerLeft(_) => "peer-left",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedNotice {
    pub session_id: SessionId,
    pub peer_display_name: String,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLeftNotice {
    pub session_id: SessionId,
    pub reason: CloseReason,
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTicket {
    pub participant_id: ParticipantId,
    pub queue_position: usize,
}

/// Rough wait estimate in minutes, as an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedWait {
    pub min_minutes: u32,
    pub max_minutes: u32,
}

impl EstimatedWait {
    /// Derive the estimate from the number of waiting participants.
    ///
    /// Two participants leave the queue per pairing, so the wait grows with
    /// half the queue length.
    pub fn for_queue_len(waiting: usize) -> Self {
        match waiting {
            0 => Self {
                min_minutes: 0,
                max_minutes: 0,
            },
            1 => Self {
                min_minutes: 1,
                max_minutes: 2,
            },
            n => {
                let m = n.div_ceil(2) as u32;
                Self {
                    min_minutes: m,
                    max_minutes: m + 1,
                }
            }
        }
    }
}

impl std::fmt::Display for EstimatedWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.max_minutes == 0 {
            f.write_str("now")
        } else {
            write!(f, "{}-{} min", self.min_minutes, self.max_minutes)
        }
    }
}

/// What a participant sees when polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ParticipantStatus {
    Waiting {
        position: usize,
        estimated_wait: EstimatedWait,
    },
    Matched {
        session_id: SessionId,
        peer_display_name: String,
        peer_present: bool,
    },
    Left {
        session_id: SessionId,
        reason: CloseReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Removed from the waiting queue
    Cancelled,
    /// Already paired; the cancel has no effect
    AlreadyMatched,
    /// The participant's session is already closed
    AlreadyLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// The participant's session was closed and the peer notified
    Closed,
    /// The session had already been closed
    AlreadyClosed,
    /// The participant was still waiting and has been removed from the queue
    LeftQueue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntryView {
    pub position: usize,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total_waiting: usize,
    pub estimated_wait: EstimatedWait,
    pub entries: Vec<QueueEntryView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub participants: [String; 2],
    pub created_at: DateTime<Utc>,
    /// Display name of a participant currently silent past the away window.
    #[serde(default)]
    pub away: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub waiting: usize,
    pub active_sessions: usize,
    pub uptime_secs: u64,
}

/// A chat message relayed through a session mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Per-sender counter
    pub id: MessageId,
    pub session_id: SessionId,
    pub sender_id: ParticipantId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}
