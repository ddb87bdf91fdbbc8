//! Heartbeat bookkeeping for channel connections.
//!
//! Records ping/pong timing for diagnostics. The channel sends a liveness
//! ping on a fixed cadence while connected; pongs are tracked for round-trip
//! logging only — a missed pong does not terminate the connection, the next
//! read or write failure does.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

/// Heartbeat tracker for one channel connection.
#[derive(Debug, Default)]
pub struct Heartbeat {
    /// Last ping sent time.
    last_ping: RwLock<Option<DateTime<Utc>>>,
    /// Last pong (transport or application level) received time.
    last_pong: RwLock<Option<DateTime<Utc>>>,
    /// Last server heartbeat frame received time.
    last_server_beat: RwLock<Option<DateTime<Utc>>>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset state (called on connection open).
    pub fn reset(&self) {
        *self.last_ping.write() = None;
        *self.last_pong.write() = None;
        *self.last_server_beat.write() = None;
    }

    /// Record that a ping was sent.
    pub fn record_ping(&self) {
        *self.last_ping.write() = Some(Utc::now());
    }

    /// Record that a pong was received, logging the round-trip time.
    pub fn record_pong(&self) {
        let now = Utc::now();
        *self.last_pong.write() = Some(now);

        if let Some(ping_time) = *self.last_ping.read() {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "received pong");
        }
    }

    /// Record a server heartbeat frame.
    pub fn record_server_beat(&self) {
        *self.last_server_beat.write() = Some(Utc::now());
    }

    /// Snapshot for status reporting.
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            last_ping: *self.last_ping.read(),
            last_pong: *self.last_pong.read(),
            last_server_beat: *self.last_server_beat.read(),
        }
    }
}

/// Heartbeat timing snapshot.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatStats {
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub last_server_beat: Option<DateTime<Utc>>,
}

impl HeartbeatStats {
    /// Milliseconds since the last pong, if one was received.
    pub fn pong_age_ms(&self) -> Option<i64> {
        self.last_pong.map(|t| (Utc::now() - t).num_milliseconds())
    }

    /// Milliseconds since the last server heartbeat frame, if any.
    pub fn server_beat_age_ms(&self) -> Option<i64> {
        self.last_server_beat
            .map(|t| (Utc::now() - t).num_milliseconds())
    }
}
