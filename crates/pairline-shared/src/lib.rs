//! # pairline-shared
//!
//! Identifiers, wire types and the error taxonomy shared by the pairing
//! core and the HTTP server.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{CreateError, DeliveryError, PairingError};
pub use types::{CloseReason, MessageId, ParticipantId, ParticipantState, SessionId};
