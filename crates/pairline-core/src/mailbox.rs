//! Per-session message mailboxes.
//!
//! Each participant of a session has an inbox; the sender appends to the
//! peer's inbox and the peer drains it. Message ids count per sender.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use pairline_shared::constants::MAX_MESSAGE_SIZE;
use pairline_shared::protocol::ChatMessage;
use pairline_shared::{MessageId, PairingError, ParticipantId, SessionId};

#[derive(Debug, Default)]
struct SessionMailbox {
    inboxes: HashMap<ParticipantId, VecDeque<ChatMessage>>,
    sent: HashMap<ParticipantId, u64>,
}

#[derive(Debug, Default)]
pub struct Mailboxes {
    boxes: Mutex<HashMap<SessionId, SessionMailbox>>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to `recipient`'s inbox. Membership is checked by the
    /// caller; this only validates the text.
    pub async fn post(
        &self,
        session_id: &SessionId,
        sender: &ParticipantId,
        recipient: &ParticipantId,
        text: &str,
    ) -> Result<MessageId, PairingError> {
        let text = validate_text(text)?;

        let mut boxes = self.boxes.lock().await;
        let mailbox = boxes.entry(session_id.clone()).or_default();

        let counter = mailbox.sent.entry(sender.clone()).or_insert(0);
        *counter += 1;
        let id = MessageId(*counter);

        mailbox
            .inboxes
            .entry(recipient.clone())
            .or_default()
            .push_back(ChatMessage {
                id,
                session_id: session_id.clone(),
                sender_id: sender.clone(),
                text,
                timestamp: Utc::now(),
            });

        debug!(session = %session_id, sender = %sender, message = %id, "Message queued");
        Ok(id)
    }

    /// Take everything waiting for `recipient`, oldest first.
    pub async fn drain(&self, session_id: &SessionId, recipient: &ParticipantId) -> Vec<ChatMessage> {
        let mut boxes = self.boxes.lock().await;
        boxes
            .get_mut(session_id)
            .and_then(|mailbox| mailbox.inboxes.get_mut(recipient))
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub async fn pending(&self, session_id: &SessionId, recipient: &ParticipantId) -> usize {
        let boxes = self.boxes.lock().await;
        boxes
            .get(session_id)
            .and_then(|mailbox| mailbox.inboxes.get(recipient))
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn discard(&self, session_id: &SessionId) {
        if self.boxes.lock().await.remove(session_id).is_some() {
            debug!(session = %session_id, "Discarded mailbox");
        }
    }
}

fn validate_text(text: &str) -> Result<String, PairingError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PairingError::InvalidMessage("empty message".to_string()));
    }
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(PairingError::InvalidMessage(format!(
            "message is {} bytes (max {MAX_MESSAGE_SIZE})",
            text.len()
        )));
    }
    Ok(text.to_string())
}
