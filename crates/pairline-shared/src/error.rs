use thiserror::Error;

use crate::types::{ParticipantId, SessionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("Participant {0} is already queued or matched")]
    DuplicateParticipant(ParticipantId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session creation failed: {0}")]
    SessionCreateFailed(#[from] CreateError),

    #[error("Notification to {participant} not delivered: {reason}")]
    DeliveryFailed {
        participant: ParticipantId,
        reason: DeliveryError,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Participant {participant} is not a member of session {session}")]
    NotAMember {
        participant: ParticipantId,
        session: SessionId,
    },

    #[error("Session {0} is closed")]
    SessionClosed(SessionId),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("no unused session id after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },

    #[error("cannot pair {0} with itself")]
    SameParticipant(ParticipantId),

    #[error("{0} is already in an active session")]
    AlreadyPaired(ParticipantId),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no subscriber")]
    NoSubscriber,

    #[error("subscriber buffer full")]
    Full,

    #[error("subscriber disconnected")]
    Disconnected,
}

impl PairingError {
    /// Errors that leave the store consistent and can simply be retried on
    /// the next sweep.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PairingError::SessionCreateFailed(_)
                | PairingError::StoreUnavailable(_)
                | PairingError::DeliveryFailed { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PairingError>;
