//! The pairing sweep.
//!
//! Each tick drains the waiting queue two at a time, oldest first. Dequeue,
//! session creation and liveness tracking happen inside one queue critical
//! section, so a concurrent cancel or rejoin either acts before the
//! participant is paired or observes the finished match. Notifications go
//! out after the queue is released.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use pairline_shared::protocol::MatchedNotice;
use pairline_shared::{CreateError, PairingError, SessionId};

use crate::lifecycle::RoomLifecycleTracker;
use crate::models::{Participant, Session};
use crate::notify::NotificationSink;
use crate::queue::{QueueStore, WaitingLine};
use crate::registry::SessionRegistry;

/// What one pairing sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pairs_formed: usize,
    /// Participants put back at the head after a store-wide create failure.
    pub requeued: usize,
    /// Stale entries discarded because the id was already in a session.
    pub dropped: usize,
    pub sessions: Vec<SessionId>,
    pub skipped: bool,
}

/// How the loop continues after a failed create.
enum Recovery {
    /// Keep draining; the healthy participant is back at the head.
    Continue,
    /// Stop this tick; the pair is back at the head.
    EndTick,
}

pub struct PairingEngine {
    queue: Arc<QueueStore>,
    registry: Arc<SessionRegistry>,
    tracker: Arc<RoomLifecycleTracker>,
    notifier: Arc<dyn NotificationSink>,
    sweep_lock: Mutex<()>,
}

impl PairingEngine {
    pub fn new(
        queue: Arc<QueueStore>,
        registry: Arc<SessionRegistry>,
        tracker: Arc<RoomLifecycleTracker>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            queue,
            registry,
            tracker,
            notifier,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Pair everyone who can be paired right now.
    ///
    /// A participant that cannot be paired on its own account is dropped and
    /// its partner keeps its place. When the store itself refuses, the pair
    /// goes back to the front and is retried first on the next tick.
    pub async fn sweep(&self) -> SweepReport {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            debug!("Pairing sweep still running, skipping tick");
            return SweepReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = SweepReport::default();
        let mut formed = Vec::new();

        {
            let mut line = self.queue.lock().await;
            while let Some((first, second)) = line.dequeue_pair() {
                match self.registry.create(first.clone(), second.clone()).await {
                    Ok(session) => {
                        self.tracker.track(&session).await;
                        report.pairs_formed += 1;
                        report.sessions.push(session.id.clone());
                        formed.push(session);
                    }
                    Err(e) => match recover(&mut line, &mut report, first, second, e) {
                        Recovery::Continue => {}
                        Recovery::EndTick => break,
                    },
                }
            }
        }

        for session in &formed {
            info!(
                session = %session.id,
                first = %session.participants[0].display_name,
                second = %session.participants[1].display_name,
                "Participants paired"
            );
            self.announce(session).await;
        }

        if report.pairs_formed > 0 || report.requeued > 0 || report.dropped > 0 {
            debug!(
                pairs = report.pairs_formed,
                requeued = report.requeued,
                dropped = report.dropped,
                "Pairing sweep finished"
            );
        }
        report
    }

    /// Tell both participants where to go, unless the session already closed
    /// in the meantime. Each notification is independent; a failed delivery
    /// is recovered by the participant's next status poll.
    async fn announce(&self, session: &Session) {
        match self.registry.get(&session.id).await {
            Ok(current) if current.is_active() => {}
            _ => {
                debug!(session = %session.id, "Session closed before announcement, skipping");
                return;
            }
        }

        for participant in &session.participants {
            let Some(peer) = session.peer_of(&participant.id) else {
                continue;
            };
            let notice = MatchedNotice {
                session_id: session.id.clone(),
                peer_display_name: peer.display_name.clone(),
                matched_at: session.created_at,
            };
            if let Err(e) = self.notifier.notify_matched(&participant.id, notice) {
                debug!(
                    session = %session.id,
                    participant = %participant.id,
                    error = %e,
                    "Match notification not delivered"
                );
            }
        }
    }
}

/// Put the queue back in order after `registry.create` refused a pair.
fn recover(
    line: &mut WaitingLine,
    report: &mut SweepReport,
    first: Participant,
    second: Participant,
    err: PairingError,
) -> Recovery {
    match &err {
        PairingError::SessionCreateFailed(CreateError::AlreadyPaired(paired)) => {
            let (stale, keep) = if &first.id == paired {
                (first, second)
            } else {
                (second, first)
            };
            warn!(
                participant = %stale.id,
                error = %err,
                "Dropping queue entry for participant already in a session"
            );
            line.push_front(keep);
            report.dropped += 1;
            Recovery::Continue
        }
        PairingError::SessionCreateFailed(CreateError::SameParticipant(id)) => {
            warn!(participant = %id, "Dropping duplicate queue entry");
            line.push_front(first);
            report.dropped += 1;
            Recovery::Continue
        }
        _ => {
            if err.is_transient() {
                warn!(
                    first = %first.id,
                    second = %second.id,
                    error = %err,
                    "Session create failed, requeueing pair at the front"
                );
            } else {
                error!(
                    first = %first.id,
                    second = %second.id,
                    error = %err,
                    "Session create rejected, requeueing pair at the front"
                );
            }
            line.push_front_pair(first, second);
            report.requeued += 2;
            Recovery::EndTick
        }
    }
}
