//! Push channel client for momentum subscriptions.
//!
//! Provides resilient WebSocket connectivity with:
//! - Handshake timeout (a stalled open counts as one failed attempt)
//! - Liveness heartbeat pings while connected
//! - Close-code classification (intentional / auth-rejected / retryable)
//! - Bounded exponential-backoff reconnection with a terminal errored state
//! - Manual reconnect that bypasses any pending backoff delay

pub mod channel;
pub mod error;
pub mod heartbeat;
pub mod message;

pub use channel::{compute_backoff_delay, ChannelConfig, ChannelEvent, ChannelManager};
pub use error::{ChannelError, ChannelResult};
pub use heartbeat::{Heartbeat, HeartbeatStats};
pub use message::{
    classify_close_code, ClientMessage, CloseClass, ServerMessage, DEFAULT_AUTH_REJECTED_CODE,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
