//! Fallback poller for momentum subscriptions.
//!
//! Pull-based data source that substitutes for the push channel while it is
//! unavailable. Fetches the identical momentum sample shape from a per-key
//! poll endpoint, so the arbitration layer treats both sources uniformly.

pub mod error;
pub mod poller;

pub use error::{PollError, PollResult};
pub use poller::{FallbackPoller, PollerConfig, PollerEvent};
