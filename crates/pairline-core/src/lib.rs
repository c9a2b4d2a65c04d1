//! # pairline-core
//!
//! Matchmaking core: the FIFO admission queue, the periodic pairing sweep,
//! session records, liveness tracking and participant notifications.
//!
//! Everything is owned by an explicitly constructed [`MatchService`]; there
//! is no global state. Transports (the HTTP server, tests) hold an
//! `Arc<MatchService>` and call into it.

pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod mailbox;
pub mod models;
pub mod notify;
pub mod queue;
pub mod registry;
pub mod service;

pub use config::PairingConfig;
pub use engine::{PairingEngine, SweepReport};
pub use lifecycle::{LivenessReport, Presence, RoomLifecycleTracker};
pub use mailbox::Mailboxes;
pub use models::{Participant, Session, SessionStatus};
pub use notify::{ChannelNotifier, NotificationSink};
pub use queue::{QueueEntry, QueueStore};
pub use registry::{CloseOutcome, SessionRegistry};
pub use service::{MatchService, SweepHandles};
