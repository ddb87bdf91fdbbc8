//! Momentum feed orchestration.
//!
//! Ties the push channel (`pulse-ws`) and the fallback poller
//! (`pulse-fallback`) together into one source-agnostic view per tracked
//! game, and manages the set of live subscriptions.

pub mod error;
pub mod registry;
pub mod subscription;

pub use error::{FeedError, FeedResult};
pub use registry::{KeySlot, SubscriptionRegistry};
pub use subscription::{
    fallback_should_be_active, MomentumSubscription, SubscriptionBuilder, SubscriptionClass,
    SubscriptionState,
};
