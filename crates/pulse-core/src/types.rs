//! Common data types for momentum feeds.
//!
//! Contains the momentum sample wire shape shared by the push channel and the
//! fallback poll endpoint, plus the per-subscription connection state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of subjects a momentum comparison is defined over.
pub const COMPARISON_SUBJECTS: usize = 2;

/// A momentum snapshot for one tracked game.
///
/// The same shape arrives from the push channel (`data` messages) and from
/// the fallback poll endpoint, so consumers never need to special-case the
/// source. Subjects are keyed in a `BTreeMap` so iteration order is
/// deterministic: "subject 1" is the lexicographically first id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentumSample {
    /// Momentum score per team subject id.
    pub team_momentum: BTreeMap<String, f64>,
    /// Optional per-player momentum scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_momentum: Option<BTreeMap<String, f64>>,
    /// When this sample was received locally. Not part of the wire shape.
    #[serde(skip, default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl MomentumSample {
    /// Create a sample from team scores, stamped with the current time.
    pub fn new(team_momentum: BTreeMap<String, f64>) -> Self {
        Self {
            team_momentum,
            player_momentum: None,
            received_at: Utc::now(),
        }
    }

    /// Team entries in deterministic (lexicographic) subject order.
    pub fn team_entries(&self) -> Vec<(String, f64)> {
        self.team_momentum
            .iter()
            .map(|(id, v)| (id.clone(), *v))
            .collect()
    }

    /// Whether this sample carries exactly the two subjects a comparison needs.
    pub fn is_comparable(&self) -> bool {
        self.team_momentum.len() == COMPARISON_SUBJECTS
    }

    /// Sample age in milliseconds.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.received_at).num_milliseconds()
    }
}

/// Connection status for a subscription's push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Handshake in progress.
    Connecting,
    /// Channel open and authoritative.
    Connected,
    /// Channel closed; a retry may be pending.
    Disconnected,
    /// Terminal failure; only a manual reconnect recovers.
    Errored,
}

impl ConnectionStatus {
    /// True while the channel is usable or actively being established.
    ///
    /// The fallback poller runs exactly when this is false.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Full connection state for one subscription key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionState {
    /// Current status.
    pub status: ConnectionStatus,
    /// Consecutive failed attempts since the last successful open.
    pub retry_count: u32,
    /// Deadline of the pending automatic retry, if one is scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl ConnectionState {
    /// Fresh state for a new subscription.
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            retry_count: 0,
            next_retry_at: None,
        }
    }

    /// Transition to a new status, clearing any pending retry deadline.
    pub fn with_status(self, status: ConnectionStatus) -> Self {
        Self {
            status,
            retry_count: self.retry_count,
            next_retry_at: None,
        }
    }

    /// True while the channel is usable or actively being established.
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{"teamMomentum":{"home":6.2,"away":2.1},"playerMomentum":{"p1":0.5}}"#
    }

    #[test]
    fn test_sample_wire_shape() {
        let sample: MomentumSample = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(sample.team_momentum.len(), 2);
        assert_eq!(sample.team_momentum["home"], 6.2);
        assert_eq!(
            sample.player_momentum.as_ref().unwrap()["p1"],
            0.5
        );
        assert!(sample.is_comparable());
    }

    #[test]
    fn test_sample_without_player_momentum() {
        let json = r#"{"teamMomentum":{"home":1.0,"away":1.0}}"#;
        let sample: MomentumSample = serde_json::from_str(json).unwrap();
        assert!(sample.player_momentum.is_none());

        let out = serde_json::to_string(&sample).unwrap();
        assert!(!out.contains("playerMomentum"));
        assert!(!out.contains("received_at"));
    }

    #[test]
    fn test_team_entries_deterministic_order() {
        let sample: MomentumSample = serde_json::from_str(sample_json()).unwrap();
        let entries = sample.team_entries();
        // BTreeMap yields lexicographic order regardless of wire order.
        assert_eq!(entries[0].0, "away");
        assert_eq!(entries[1].0, "home");
    }

    #[test]
    fn test_status_is_live() {
        assert!(ConnectionStatus::Connecting.is_live());
        assert!(ConnectionStatus::Connected.is_live());
        assert!(!ConnectionStatus::Disconnected.is_live());
        assert!(!ConnectionStatus::Errored.is_live());
    }

    #[test]
    fn test_state_transition_clears_deadline() {
        let state = ConnectionState {
            status: ConnectionStatus::Disconnected,
            retry_count: 2,
            next_retry_at: Some(Utc::now()),
        };
        let next = state.with_status(ConnectionStatus::Connecting);
        assert_eq!(next.status, ConnectionStatus::Connecting);
        assert_eq!(next.retry_count, 2);
        assert!(next.next_retry_at.is_none());
    }
}
