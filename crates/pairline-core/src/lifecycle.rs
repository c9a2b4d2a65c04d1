//! Liveness tracking for active sessions.
//!
//! Every matched participant reports activity (heartbeats, sent messages).
//! A session closes when a participant leaves explicitly or stays silent
//! past the liveness threshold; the remaining participant is notified.
//! Closed sessions never reopen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pairline_shared::protocol::PeerLeftNotice;
use pairline_shared::{CloseReason, PairingError, ParticipantId, SessionId};

use crate::config::PairingConfig;
use crate::mailbox::Mailboxes;
use crate::models::Session;
use crate::notify::NotificationSink;
use crate::registry::{CloseOutcome, SessionRegistry};

/// Presence of the two participants of an active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    BothPresent,
    /// This participant has been silent longer than `away_after`.
    PeerAway(ParticipantId),
}

/// What one liveness sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub closed: Vec<SessionId>,
    pub purged: usize,
    pub skipped: bool,
}

pub struct RoomLifecycleTracker {
    registry: Arc<SessionRegistry>,
    mailboxes: Arc<Mailboxes>,
    notifier: Arc<dyn NotificationSink>,
    last_seen: Mutex<HashMap<SessionId, HashMap<ParticipantId, Instant>>>,
    threshold: Duration,
    away_after: Duration,
    retention: Duration,
    sweep_lock: Mutex<()>,
}

impl RoomLifecycleTracker {
    pub fn new(
        registry: Arc<SessionRegistry>,
        mailboxes: Arc<Mailboxes>,
        notifier: Arc<dyn NotificationSink>,
        config: &PairingConfig,
    ) -> Self {
        Self {
            registry,
            mailboxes,
            notifier,
            last_seen: Mutex::new(HashMap::new()),
            threshold: config.liveness_threshold,
            away_after: config.away_after,
            retention: config.closed_retention,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Start watching a freshly created session. Both participants count as
    /// seen now. A session that closed before this call is not tracked.
    pub async fn track(&self, session: &Session) {
        let mut last_seen = self.last_seen.lock().await;
        match self.registry.get(&session.id).await {
            Ok(current) if current.is_active() => {}
            _ => {
                debug!(session = %session.id, "Session closed before tracking, ignoring");
                return;
            }
        }

        let now = Instant::now();
        let seen = session
            .participant_ids()
            .into_iter()
            .map(|id| (id.clone(), now))
            .collect();
        last_seen.insert(session.id.clone(), seen);
    }

    #[cfg(test)]
    pub async fn is_tracked(&self, session_id: &SessionId) -> bool {
        self.last_seen.lock().await.contains_key(session_id)
    }

    /// Record activity from a matched participant.
    pub async fn heartbeat(&self, participant: &ParticipantId) -> Result<SessionId, PairingError> {
        let session = self.registry.find_by_participant(participant).await?;
        self.touch(&session.id, participant).await;
        Ok(session.id)
    }

    pub async fn touch(&self, session_id: &SessionId, participant: &ParticipantId) {
        let mut last_seen = self.last_seen.lock().await;
        let Some(seen) = last_seen.get_mut(session_id) else {
            debug!(session = %session_id, participant = %participant, "Activity for untracked session");
            return;
        };
        seen.insert(participant.clone(), Instant::now());
        debug!(session = %session_id, participant = %participant, "Activity recorded");
    }

    /// Time since `participant` was last seen in `session_id`.
    pub async fn silence(&self, session_id: &SessionId, participant: &ParticipantId) -> Option<Duration> {
        let last_seen = self.last_seen.lock().await;
        last_seen
            .get(session_id)
            .and_then(|seen| seen.get(participant))
            .map(Instant::elapsed)
    }

    /// Away state of a session. When both participants are away, the one
    /// silent the longest is reported.
    pub async fn presence(&self, session_id: &SessionId) -> Presence {
        let last_seen = self.last_seen.lock().await;
        let away = last_seen.get(session_id).and_then(|seen| {
            seen.iter()
                .filter(|(_, at)| at.elapsed() > self.away_after)
                .min_by_key(|(_, at)| **at)
                .map(|(id, _)| id.clone())
        });
        match away {
            Some(id) => Presence::PeerAway(id),
            None => Presence::BothPresent,
        }
    }

    /// Whether `participant` is currently within the away window.
    pub async fn is_present(&self, session_id: &SessionId, participant: &ParticipantId) -> bool {
        self.silence(session_id, participant)
            .await
            .map_or(true, |silence| silence <= self.away_after)
    }

    /// Explicit leave: close the participant's session right away and tell
    /// the peer. Returns `Ok(None)` when the session had already closed.
    pub async fn leave(&self, participant: &ParticipantId) -> Result<Option<Session>, PairingError> {
        let session = match self.registry.find_by_participant(participant).await {
            Ok(session) => session,
            Err(PairingError::ParticipantNotFound(_)) => {
                if self.registry.departed(participant).await.is_some() {
                    debug!(participant = %participant, "Leave for already closed session");
                    return Ok(None);
                }
                return Err(PairingError::ParticipantNotFound(participant.clone()));
            }
            Err(e) => return Err(e),
        };

        info!(session = %session.id, participant = %participant, "Participant left session");
        self.close_session(&session.id, CloseReason::Left, &[participant.clone()])
            .await
    }

    /// Close a session and notify everyone who did not cause the close.
    /// When every participant is among `departing`, all are notified.
    async fn close_session(
        &self,
        session_id: &SessionId,
        reason: CloseReason,
        departing: &[ParticipantId],
    ) -> Result<Option<Session>, PairingError> {
        let outcome = self.registry.close(session_id, reason).await?;
        self.last_seen.lock().await.remove(session_id);

        let CloseOutcome::Closed(session) = outcome else {
            return Ok(None);
        };

        let mut recipients: Vec<&ParticipantId> = session
            .participant_ids()
            .into_iter()
            .filter(|id| !departing.contains(*id))
            .collect();
        if recipients.is_empty() {
            recipients = session.participant_ids().to_vec();
        }

        for recipient in recipients {
            let notice = PeerLeftNotice {
                session_id: session.id.clone(),
                reason,
            };
            if let Err(e) = self.notifier.notify_peer_left(recipient, notice) {
                debug!(
                    session = %session.id,
                    participant = %recipient,
                    error = %e,
                    "Peer-left notification not delivered; status poll will report it"
                );
            }
        }

        Ok(Some(session))
    }

    /// One liveness pass: close sessions with a silent participant, then
    /// purge closed sessions past retention. Skipped if another pass is
    /// still running.
    pub async fn sweep(&self) -> LivenessReport {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("Liveness sweep still running, skipping tick");
            return LivenessReport {
                skipped: true,
                ..Default::default()
            };
        };

        let stale: Vec<(SessionId, Vec<ParticipantId>)> = {
            let last_seen = self.last_seen.lock().await;
            last_seen
                .iter()
                .filter_map(|(session_id, seen)| {
                    let silent: Vec<_> = seen
                        .iter()
                        .filter(|(_, at)| at.elapsed() > self.threshold)
                        .map(|(id, _)| id.clone())
                        .collect();
                    (!silent.is_empty()).then(|| (session_id.clone(), silent))
                })
                .collect()
        };

        let mut report = LivenessReport::default();
        for (session_id, silent) in stale {
            info!(session = %session_id, silent = silent.len(), "Liveness threshold exceeded");
            match self
                .close_session(&session_id, CloseReason::TimedOut, &silent)
                .await
            {
                Ok(Some(_)) => report.closed.push(session_id),
                Ok(None) => {}
                Err(PairingError::SessionNotFound(_)) => {
                    self.last_seen.lock().await.remove(&session_id);
                }
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Failed to close timed out session");
                }
            }
        }

        for session_id in self.registry.purge_closed(self.retention).await {
            self.mailboxes.discard(&session_id).await;
            report.purged += 1;
        }

        report
    }
}
