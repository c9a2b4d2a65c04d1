//! Delivery of "paired" and "peer left" events to individual participants.
//!
//! Delivery is best effort and never blocks the caller. Anything a
//! participant misses stays discoverable through a status poll.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use pairline_shared::protocol::{MatchedNotice, Notification, PeerLeftNotice};
use pairline_shared::{DeliveryError, PairingError, ParticipantId};

/// Where the core sends participant events.
pub trait NotificationSink: Send + Sync {
    fn notify_matched(
        &self,
        participant: &ParticipantId,
        notice: MatchedNotice,
    ) -> Result<(), PairingError>;

    fn notify_peer_left(
        &self,
        participant: &ParticipantId,
        notice: PeerLeftNotice,
    ) -> Result<(), PairingError>;
}

/// Per-participant bounded channels. A participant subscribes once and
/// receives every later event on the returned receiver.
pub struct ChannelNotifier {
    subscribers: Mutex<HashMap<ParticipantId, mpsc::Sender<Notification>>>,
    capacity: usize,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<ParticipantId, mpsc::Sender<Notification>>> {
        // Entries are plain senders; a panic mid-insert cannot leave one half-written.
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or replace) the participant's event channel.
    pub fn subscribe(&self, participant: &ParticipantId) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.subscribers().insert(participant.clone(), tx).is_some() {
            debug!(participant = %participant, "Replaced existing notification subscriber");
        }
        rx
    }

    pub fn unsubscribe(&self, participant: &ParticipantId) {
        self.subscribers().remove(participant);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Drop senders whose receiver is gone.
    pub fn prune_closed(&self) -> usize {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|_, tx| !tx.is_closed());
        before - subscribers.len()
    }

    /// Push one event to a participant without waiting.
    pub fn deliver(
        &self,
        participant: &ParticipantId,
        event: Notification,
    ) -> Result<(), PairingError> {
        let mut subscribers = self.subscribers();
        let Some(tx) = subscribers.get(participant) else {
            return Err(delivery_failed(participant, DeliveryError::NoSubscriber));
        };

        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(participant = %participant, "Dropping notification for slow subscriber");
                Err(delivery_failed(participant, DeliveryError::Full))
            }
            Err(TrySendError::Closed(_)) => {
                subscribers.remove(participant);
                Err(delivery_failed(participant, DeliveryError::Disconnected))
            }
        }
    }
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new(pairline_shared::constants::DEFAULT_NOTIFY_CHANNEL_CAPACITY)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify_matched(
        &self,
        participant: &ParticipantId,
        notice: MatchedNotice,
    ) -> Result<(), PairingError> {
        self.deliver(participant, Notification::Matched(notice))
    }

    fn notify_peer_left(
        &self,
        participant: &ParticipantId,
        notice: PeerLeftNotice,
    ) -> Result<(), PairingError> {
        self.deliver(participant, Notification::PeerLeft(notice))
    }
}

fn delivery_failed(participant: &ParticipantId, reason: DeliveryError) -> PairingError {
    PairingError::DeliveryFailed {
        participant: participant.clone(),
        reason,
    }
}
