//! Tunables for the pairing and liveness machinery.

use std::time::Duration;

use pairline_shared::constants::{
    DEFAULT_AWAY_AFTER_SECS, DEFAULT_CLOSED_RETENTION_SECS, DEFAULT_LIVENESS_SWEEP_INTERVAL_MS,
    DEFAULT_LIVENESS_THRESHOLD_SECS, DEFAULT_NOTIFY_CHANNEL_CAPACITY, DEFAULT_PAIRING_INTERVAL_MS,
    DEFAULT_SESSION_ID_ATTEMPTS,
};

#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Cadence of the pairing sweep.
    pub pairing_interval: Duration,

    /// Cadence of the liveness sweep.
    pub liveness_sweep_interval: Duration,

    /// Maximum silence before a matched participant is presumed gone.
    pub liveness_threshold: Duration,

    /// Silence after which a participant is reported as away to its peer.
    /// Must be below `liveness_threshold` to be observable.
    pub away_after: Duration,

    /// How long a closed session stays queryable (status polls report
    /// `Left`, undrained messages can still be fetched).
    pub closed_retention: Duration,

    /// Session id draws before `create` gives up.
    pub session_id_attempts: u32,

    /// Maximum number of simultaneously active sessions (0 = unlimited).
    pub max_active_sessions: usize,

    /// Per-participant notification buffer.
    pub notify_channel_capacity: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            pairing_interval: Duration::from_millis(DEFAULT_PAIRING_INTERVAL_MS),
            liveness_sweep_interval: Duration::from_millis(DEFAULT_LIVENESS_SWEEP_INTERVAL_MS),
            liveness_threshold: Duration::from_secs(DEFAULT_LIVENESS_THRESHOLD_SECS),
            away_after: Duration::from_secs(DEFAULT_AWAY_AFTER_SECS),
            closed_retention: Duration::from_secs(DEFAULT_CLOSED_RETENTION_SECS),
            session_id_attempts: DEFAULT_SESSION_ID_ATTEMPTS,
            max_active_sessions: 0,
            notify_channel_capacity: DEFAULT_NOTIFY_CHANNEL_CAPACITY,
        }
    }
}
