//! The participant-facing service object.
//!
//! `MatchService` owns every store and runs the two periodic sweeps. It is
//! built once at process start and shared by handle (`Arc`) with whatever
//! transport serves participants.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use pairline_shared::protocol::{
    CancelOutcome, ChatMessage, EstimatedWait, JoinTicket, LeaveOutcome, MatchedNotice,
    Notification, ParticipantStatus, PeerLeftNotice, QueueStatus, SessionSummary, SystemStatus,
};
use pairline_shared::{CloseReason, MessageId, PairingError, ParticipantId, SessionId};

use crate::config::PairingConfig;
use crate::engine::{PairingEngine, SweepReport};
use crate::lifecycle::{LivenessReport, Presence, RoomLifecycleTracker};
use crate::mailbox::Mailboxes;
use crate::models::{Participant, Session, SessionStatus};
use crate::notify::{ChannelNotifier, NotificationSink};
use crate::queue::QueueStore;
use crate::registry::SessionRegistry;

pub struct MatchService {
    config: PairingConfig,
    queue: Arc<QueueStore>,
    registry: Arc<SessionRegistry>,
    mailboxes: Arc<Mailboxes>,
    notifier: Arc<ChannelNotifier>,
    tracker: Arc<RoomLifecycleTracker>,
    engine: PairingEngine,
    started_at: Instant,
}

impl MatchService {
    pub fn new(config: PairingConfig) -> Self {
        let registry =
            SessionRegistry::new(config.session_id_attempts, config.max_active_sessions);
        Self::with_registry(config, registry)
    }

    /// Build around a preconfigured registry (custom id source, limits).
    pub fn with_registry(config: PairingConfig, registry: SessionRegistry) -> Self {
        let queue = Arc::new(QueueStore::new());
        let registry = Arc::new(registry);
        let mailboxes = Arc::new(Mailboxes::new());
        let notifier = Arc::new(ChannelNotifier::new(config.notify_channel_capacity));
        let sink: Arc<dyn NotificationSink> = notifier.clone();

        let tracker = Arc::new(RoomLifecycleTracker::new(
            registry.clone(),
            mailboxes.clone(),
            sink.clone(),
            &config,
        ));
        let engine = PairingEngine::new(queue.clone(), registry.clone(), tracker.clone(), sink);

        Self {
            config,
            queue,
            registry,
            mailboxes,
            notifier,
            tracker,
            engine,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Admit a new anonymous participant.
    pub async fn join(&self, display_name: &str) -> Result<JoinTicket, PairingError> {
        self.admit(Participant::new(display_name)).await
    }

    /// Admit a participant with a caller-chosen id. Fails if that id is
    /// already waiting or matched.
    ///
    /// Both checks and the push happen under the queue lock, so a sweep
    /// cannot pair the id in between.
    pub async fn admit(&self, participant: Participant) -> Result<JoinTicket, PairingError> {
        let mut line = self.queue.lock().await;
        if self.registry.find_by_participant(&participant.id).await.is_ok() {
            return Err(PairingError::DuplicateParticipant(participant.id));
        }
        let participant_id = participant.id.clone();
        let queue_position = line.push_back(participant)?;
        drop(line);

        Ok(JoinTicket {
            participant_id,
            queue_position,
        })
    }

    /// Withdraw from the queue. Once matched, cancelling has no effect.
    pub async fn cancel(&self, participant: &ParticipantId) -> Result<CancelOutcome, PairingError> {
        if self.queue.remove(participant).await {
            self.notifier.unsubscribe(participant);
            return Ok(CancelOutcome::Cancelled);
        }

        if let Ok(session) = self.registry.find_by_participant(participant).await {
            info!(
                participant = %participant,
                session = %session.id,
                "Cancel ignored, participant already matched"
            );
            return Ok(CancelOutcome::AlreadyMatched);
        }

        if self.registry.departed(participant).await.is_some() {
            debug!(participant = %participant, "Cancel ignored, session already closed");
            return Ok(CancelOutcome::AlreadyLeft);
        }

        Err(PairingError::ParticipantNotFound(participant.clone()))
    }

    pub async fn queue_status(&self) -> QueueStatus {
        let entries: Vec<_> = self.queue.snapshot().await.iter().map(|e| e.view()).collect();
        QueueStatus {
            total_waiting: entries.len(),
            estimated_wait: EstimatedWait::for_queue_len(entries.len()),
            entries,
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Record activity. Waiting participants are acknowledged without effect.
    pub async fn heartbeat(&self, participant: &ParticipantId) -> Result<(), PairingError> {
        match self.tracker.heartbeat(participant).await {
            Ok(_) => Ok(()),
            Err(PairingError::ParticipantNotFound(_)) => {
                if self.queue.position(participant).await.is_some() {
                    Ok(())
                } else {
                    Err(PairingError::ParticipantNotFound(participant.clone()))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Leave the current session, or the queue when still waiting.
    pub async fn leave(&self, participant: &ParticipantId) -> Result<LeaveOutcome, PairingError> {
        if self.queue.remove(participant).await {
            self.notifier.unsubscribe(participant);
            return Ok(LeaveOutcome::LeftQueue);
        }

        match self.tracker.leave(participant).await? {
            Some(_) => Ok(LeaveOutcome::Closed),
            None => Ok(LeaveOutcome::AlreadyClosed),
        }
    }

    /// Where the participant currently stands. Always reflects the latest
    /// state, whether or not a pushed notification was seen.
    pub async fn poll_status(
        &self,
        participant: &ParticipantId,
    ) -> Result<ParticipantStatus, PairingError> {
        {
            let line = self.queue.lock().await;
            if let Some(position) = line.position(participant) {
                return Ok(ParticipantStatus::Waiting {
                    position,
                    estimated_wait: EstimatedWait::for_queue_len(line.len()),
                });
            }
        }

        if let Ok(session) = self.registry.find_by_participant(participant).await {
            let peer = peer_of(&session, participant)?;
            let peer_present = self.tracker.is_present(&session.id, &peer.id).await;
            return Ok(ParticipantStatus::Matched {
                session_id: session.id.clone(),
                peer_display_name: peer.display_name.clone(),
                peer_present,
            });
        }

        if let Some(session) = self.registry.departed(participant).await {
            return Ok(ParticipantStatus::Left {
                reason: close_reason(&session),
                session_id: session.id,
            });
        }

        Err(PairingError::ParticipantNotFound(participant.clone()))
    }

    /// Open a push channel for a participant. The current match or close
    /// outcome, if any, is replayed first so nothing decided before the
    /// subscription is missed.
    pub async fn subscribe(
        &self,
        participant: &ParticipantId,
    ) -> Result<mpsc::Receiver<Notification>, PairingError> {
        let status = self.poll_status(participant).await?;
        let rx = self.notifier.subscribe(participant);

        let replay = match status {
            ParticipantStatus::Waiting { .. } => Ok(()),
            ParticipantStatus::Matched {
                session_id,
                peer_display_name,
                ..
            } => {
                let matched_at = self.registry.get(&session_id).await?.created_at;
                self.notifier.notify_matched(
                    participant,
                    MatchedNotice {
                        session_id,
                        peer_display_name,
                        matched_at,
                    },
                )
            }
            ParticipantStatus::Left { session_id, reason } => self
                .notifier
                .notify_peer_left(participant, PeerLeftNotice { session_id, reason }),
        };
        if let Err(e) = replay {
            debug!(participant = %participant, error = %e, "Replay on subscribe not delivered");
        }

        Ok(rx)
    }

    // -----------------------------------------------------------------------
    // Mailbox
    // -----------------------------------------------------------------------

    pub async fn send_message(
        &self,
        session_id: &SessionId,
        sender: &ParticipantId,
        text: &str,
    ) -> Result<MessageId, PairingError> {
        let session = self.registry.get(session_id).await?;
        let recipient = peer_of(&session, sender)?;
        if !session.is_active() {
            return Err(PairingError::SessionClosed(session_id.clone()));
        }

        let id = self
            .mailboxes
            .post(session_id, sender, &recipient.id, text)
            .await?;
        self.tracker.touch(session_id, sender).await;
        Ok(id)
    }

    /// Everything the peer sent since the last drain. Still works after the
    /// session closed, until it is purged.
    pub async fn drain_messages(
        &self,
        session_id: &SessionId,
        recipient: &ParticipantId,
    ) -> Result<Vec<ChatMessage>, PairingError> {
        let session = self.registry.get(session_id).await?;
        peer_of(&session, recipient)?;
        Ok(self.mailboxes.drain(session_id, recipient).await)
    }

    // -----------------------------------------------------------------------
    // Operator views
    // -----------------------------------------------------------------------

    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus {
            waiting: self.queue.len().await,
            active_sessions: self.registry.active_count().await,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Active sessions, oldest first, with any participant currently away.
    pub async fn active_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for session in self.registry.active_sessions().await {
            let mut summary = session.summary();
            if let Presence::PeerAway(id) = self.tracker.presence(&session.id).await {
                summary.away = session
                    .participants
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.display_name.clone());
            }
            summaries.push(summary);
        }
        summaries
    }

    // -----------------------------------------------------------------------
    // Sweeps
    // -----------------------------------------------------------------------

    pub async fn run_pairing_sweep(&self) -> SweepReport {
        self.engine.sweep().await
    }

    pub async fn run_liveness_sweep(&self) -> LivenessReport {
        let report = self.tracker.sweep().await;
        let pruned = self.notifier.prune_closed();
        if pruned > 0 {
            debug!(
                pruned,
                remaining = self.notifier.subscriber_count(),
                "Dropped disconnected notification subscribers"
            );
        }
        report
    }

    /// Spawn the pairing and liveness tickers. Ticks that fall behind are
    /// skipped, never queued.
    pub fn start(self: &Arc<Self>) -> SweepHandles {
        let (shutdown, _) = watch::channel(false);

        let pairing = {
            let service = Arc::clone(self);
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(service.config.pairing_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            service.run_pairing_sweep().await;
                        }
                        _ = stop.changed() => break,
                    }
                }
                debug!("Pairing ticker stopped");
            })
        };

        let liveness = {
            let service = Arc::clone(self);
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(service.config.liveness_sweep_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            service.run_liveness_sweep().await;
                        }
                        _ = stop.changed() => break,
                    }
                }
                debug!("Liveness ticker stopped");
            })
        };

        info!(
            pairing_ms = self.config.pairing_interval.as_millis() as u64,
            liveness_ms = self.config.liveness_sweep_interval.as_millis() as u64,
            threshold_secs = self.config.liveness_threshold.as_secs(),
            "Sweeps started"
        );

        SweepHandles {
            shutdown,
            tasks: vec![pairing, liveness],
        }
    }
}

/// Running sweep tasks. The tickers stop on `shutdown`, or once this handle
/// is dropped.
pub struct SweepHandles {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweepHandles {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Sweeps stopped");
    }
}

fn peer_of<'a>(
    session: &'a Session,
    participant: &ParticipantId,
) -> Result<&'a Participant, PairingError> {
    session
        .peer_of(participant)
        .ok_or_else(|| PairingError::NotAMember {
            participant: participant.clone(),
            session: session.id.clone(),
        })
}

fn close_reason(session: &Session) -> CloseReason {
    match session.status {
        SessionStatus::Closed { reason, .. } => reason,
        SessionStatus::Active => CloseReason::Left,
    }
}
