//! Channel wire messages and close-code classification.

use pulse_core::MomentumSample;
use serde::{Deserialize, Serialize};

/// Default application close code for rejected credentials.
///
/// Lives in the private-use close-code range. Configurable per channel.
pub const DEFAULT_AUTH_REJECTED_CODE: u16 = 4401;

/// Server-to-client message, tagged by `type`.
///
/// Unrecognized types deserialize to `Unknown` and are ignored (logged only)
/// so the connection survives schema additions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fresh momentum sample.
    Data {
        data: MomentumSample,
        #[serde(default)]
        timestamp: Option<String>,
    },
    /// Non-fatal error surfaced by the backend; connection stays open.
    Error { error: String },
    /// Application-level heartbeat from the server.
    Heartbeat {
        #[serde(default)]
        timestamp: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Client-to-server control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness ping.
    Ping,
    /// Ask the server for an immediate fresh sample after connect.
    RequestUpdate,
}

/// What a close code means for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// Deliberate termination (1000/1001); no retry.
    Intentional,
    /// Credentials rejected; terminal, the credential holder must refresh.
    AuthRejected,
    /// Anything else; eligible for backoff retry.
    Retryable,
}

/// Classify a close code against the retry policy.
pub fn classify_close_code(code: u16, auth_rejected_code: u16) -> CloseClass {
    if code == auth_rejected_code {
        CloseClass::AuthRejected
    } else if code == 1000 || code == 1001 {
        CloseClass::Intentional
    } else {
        CloseClass::Retryable
    }
}
