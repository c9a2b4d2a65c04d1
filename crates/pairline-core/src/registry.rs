//! Registry of pairing sessions, indexed by session id and by participant.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pairline_shared::{
    CloseReason, CreateError, PairingError, ParticipantId, ParticipantState, SessionId,
};

use crate::models::{Participant, Session, SessionStatus};

type IdSource = Box<dyn Fn() -> SessionId + Send + Sync>;

/// Result of [`SessionRegistry::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The session was active and is now closed. Carries the closed record.
    Closed(Session),
    /// The session had already been closed; nothing changed.
    AlreadyClosed,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Session>,
    /// Active sessions only.
    by_participant: HashMap<ParticipantId, SessionId>,
    /// Participants whose session has been closed but not yet purged.
    departed: HashMap<ParticipantId, SessionId>,
}

pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    id_attempts: u32,
    /// 0 = unlimited.
    max_active: usize,
    id_source: IdSource,
}

impl SessionRegistry {
    pub fn new(id_attempts: u32, max_active: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            id_attempts: id_attempts.max(1),
            max_active,
            id_source: Box::new(SessionId::random),
        }
    }

    /// Replace the session id generator.
    pub fn with_id_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> SessionId + Send + Sync + 'static,
    {
        self.id_source = Box::new(source);
        self
    }

    /// Create an active session for two distinct, currently unpaired
    /// participants. Both are marked `Matched`.
    pub async fn create(
        &self,
        first: Participant,
        second: Participant,
    ) -> Result<Session, PairingError> {
        if first.id == second.id {
            return Err(CreateError::SameParticipant(first.id).into());
        }

        let mut inner = self.inner.write().await;

        for p in [&first, &second] {
            if inner.by_participant.contains_key(&p.id) {
                return Err(CreateError::AlreadyPaired(p.id.clone()).into());
            }
        }

        let active = inner.by_participant.len() / 2;
        if self.max_active > 0 && active >= self.max_active {
            return Err(PairingError::StoreUnavailable(format!(
                "active session limit reached ({})",
                self.max_active
            )));
        }

        let mut session_id = None;
        for attempt in 1..=self.id_attempts {
            let candidate = (self.id_source)();
            if inner.sessions.contains_key(&candidate) {
                warn!(session = %candidate, attempt, "Session id collision, redrawing");
                continue;
            }
            session_id = Some(candidate);
            break;
        }
        let Some(session_id) = session_id else {
            return Err(CreateError::IdSpaceExhausted {
                attempts: self.id_attempts,
            }
            .into());
        };

        let mut participants = [first, second];
        for p in participants.iter_mut() {
            p.state = ParticipantState::Matched;
            inner.departed.remove(&p.id);
            inner.by_participant.insert(p.id.clone(), session_id.clone());
        }

        let session = Session {
            id: session_id.clone(),
            participants,
            created_at: Utc::now(),
            status: SessionStatus::Active,
        };
        inner.sessions.insert(session_id.clone(), session.clone());

        info!(
            session = %session_id,
            first = %session.participants[0].id,
            second = %session.participants[1].id,
            "Session created"
        );

        Ok(session)
    }

    pub async fn get(&self, session_id: &SessionId) -> Result<Session, PairingError> {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| PairingError::SessionNotFound(session_id.clone()))
    }

    /// The participant's active session.
    pub async fn find_by_participant(
        &self,
        participant: &ParticipantId,
    ) -> Result<Session, PairingError> {
        let inner = self.inner.read().await;
        inner
            .by_participant
            .get(participant)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
            .ok_or_else(|| PairingError::ParticipantNotFound(participant.clone()))
    }

    /// The closed session a participant was part of, while it is retained.
    pub async fn departed(&self, participant: &ParticipantId) -> Option<Session> {
        let inner = self.inner.read().await;
        inner
            .departed
            .get(participant)
            .and_then(|id| inner.sessions.get(id))
            .cloned()
    }

    /// Close a session. Idempotent: closing a closed session changes nothing.
    pub async fn close(
        &self,
        session_id: &SessionId,
        reason: CloseReason,
    ) -> Result<CloseOutcome, PairingError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PairingError::SessionNotFound(session_id.clone()))?;

        if !session.is_active() {
            debug!(session = %session_id, "Close requested for already closed session");
            return Ok(CloseOutcome::AlreadyClosed);
        }

        session.status = SessionStatus::Closed {
            reason,
            closed_at: Instant::now(),
        };
        for p in session.participants.iter_mut() {
            p.state = ParticipantState::Left;
            if inner.by_participant.get(&p.id) == Some(session_id) {
                inner.by_participant.remove(&p.id);
            }
            inner.departed.insert(p.id.clone(), session_id.clone());
        }

        info!(session = %session_id, %reason, "Session closed");
        Ok(CloseOutcome::Closed(session.clone()))
    }

    pub async fn active_sessions(&self) -> Vec<Session> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.by_participant.len() / 2
    }

    /// Drop closed sessions that have been closed for at least `older_than`.
    /// Returns the purged ids.
    pub async fn purge_closed(&self, older_than: Duration) -> Vec<SessionId> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let expired: Vec<SessionId> = inner
            .sessions
            .values()
            .filter_map(|s| match s.status {
                SessionStatus::Closed { closed_at, .. } if closed_at.elapsed() >= older_than => {
                    Some(s.id.clone())
                }
                _ => None,
            })
            .collect();

        for id in &expired {
            if let Some(session) = inner.sessions.remove(id) {
                for p in &session.participants {
                    if inner.departed.get(&p.id) == Some(id) {
                        inner.departed.remove(&p.id);
                    }
                }
            }
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Purged closed sessions");
        }
        expired
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(pairline_shared::constants::DEFAULT_SESSION_ID_ATTEMPTS, 0)
    }
}
