//! FIFO admission queue of waiting participants.

use std::collections::VecDeque;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use pairline_shared::protocol::QueueEntryView;
use pairline_shared::{PairingError, ParticipantId, ParticipantState};

use crate::models::Participant;

/// Waiting-state view of a participant. `position` is 1-based and derived
/// from the queue order at the time of the read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub position: usize,
    pub participant: Participant,
}

impl QueueEntry {
    pub fn view(&self) -> QueueEntryView {
        QueueEntryView {
            position: self.position,
            display_name: self.participant.display_name.clone(),
            joined_at: self.participant.joined_at_utc,
        }
    }
}

/// The ordered queue itself. Only reachable through a [`QueueStore`] lock,
/// so every method here runs inside one critical section.
#[derive(Debug, Default)]
pub struct WaitingLine {
    entries: VecDeque<Participant>,
}

impl WaitingLine {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.entries.iter().any(|p| &p.id == participant)
    }

    /// 1-based position of a waiting participant.
    pub fn position(&self, participant: &ParticipantId) -> Option<usize> {
        self.entries
            .iter()
            .position(|p| &p.id == participant)
            .map(|i| i + 1)
    }

    /// Append to the tail. Returns the 1-based position at insertion.
    pub fn push_back(&mut self, mut participant: Participant) -> Result<usize, PairingError> {
        if self.contains(&participant.id) {
            return Err(PairingError::DuplicateParticipant(participant.id));
        }
        participant.state = ParticipantState::Waiting;
        info!(
            participant = %participant.id,
            name = %participant.display_name,
            position = self.entries.len() + 1,
            "Participant queued"
        );
        self.entries.push_back(participant);
        Ok(self.entries.len())
    }

    pub fn remove(&mut self, participant: &ParticipantId) -> Option<Participant> {
        let index = self.entries.iter().position(|p| &p.id == participant)?;
        self.entries.remove(index)
    }

    /// Remove the two oldest participants, or nothing if fewer than two wait.
    pub fn dequeue_pair(&mut self) -> Option<(Participant, Participant)> {
        if self.entries.len() < 2 {
            return None;
        }
        let first = self.entries.pop_front()?;
        let second = self.entries.pop_front()?;
        Some((first, second))
    }

    /// Put a dequeued pair back at the head, `first` ahead of `second`.
    pub fn push_front_pair(&mut self, first: Participant, second: Participant) {
        self.entries.push_front(second);
        self.entries.push_front(first);
    }

    /// Put a single dequeued participant back at the head.
    pub fn push_front(&mut self, participant: Participant) {
        self.entries.push_front(participant);
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, p)| QueueEntry {
                position: i + 1,
                participant: p.clone(),
            })
            .collect()
    }
}

/// Concurrency-safe handle on the waiting queue.
#[derive(Debug, Default)]
pub struct QueueStore {
    line: Mutex<WaitingLine>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the queue for a multi-step critical section. Admission keeps it
    /// across the duplicate checks and the push; the pairing sweep keeps it
    /// across dequeue and session creation.
    pub async fn lock(&self) -> MutexGuard<'_, WaitingLine> {
        self.line.lock().await
    }

    /// Remove from anywhere in the queue. Returns whether an entry was found.
    pub async fn remove(&self, participant: &ParticipantId) -> bool {
        let removed = self.line.lock().await.remove(participant);
        match removed {
            Some(p) => {
                info!(participant = %p.id, name = %p.display_name, "Participant removed from queue");
                true
            }
            None => {
                debug!(participant = %participant, "Remove requested for participant not in queue");
                false
            }
        }
    }

    pub async fn position(&self, participant: &ParticipantId) -> Option<usize> {
        self.line.lock().await.position(participant)
    }

    pub async fn len(&self) -> usize {
        self.line.lock().await.len()
    }

    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        self.line.lock().await.snapshot()
    }
}
