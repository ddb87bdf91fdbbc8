//! Per-key subscription registry.
//!
//! Holds at most one `MomentumSubscription` per tracked game key and exposes
//! the consumer-facing operations keyed by game. `KeySlot` layers an explicit
//! previous-vs-current key state machine on top for single-slot consumers
//! that track one game at a time.

use crate::error::{FeedError, FeedResult};
use crate::subscription::{MomentumSubscription, SubscriptionBuilder, SubscriptionClass, SubscriptionState};
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse_core::{ConnectionState, MomentumSample};
use pulse_flash::FlashPattern;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of live subscriptions, at most one per key.
pub struct SubscriptionRegistry {
    builder: SubscriptionBuilder,
    classes: HashMap<String, SubscriptionClass>,
    subscriptions: DashMap<String, Arc<MomentumSubscription>>,
}

impl SubscriptionRegistry {
    pub fn new(builder: SubscriptionBuilder, classes: HashMap<String, SubscriptionClass>) -> Self {
        Self {
            builder,
            classes,
            subscriptions: DashMap::new(),
        }
    }

    /// Subscribe to a key. Returns the existing subscription if one is
    /// already live for this key.
    pub fn subscribe(
        &self,
        key: &str,
        class: Option<&str>,
    ) -> FeedResult<Arc<MomentumSubscription>> {
        if let Some(existing) = self.subscriptions.get(key) {
            debug!(key, "already subscribed");
            return Ok(existing.clone());
        }

        let class = class
            .map(|name| {
                self.classes
                    .get(name)
                    .copied()
                    .ok_or_else(|| FeedError::UnknownClass(name.to_string()))
            })
            .transpose()?;

        let subscription = self.builder.build(key, class.as_ref())?;
        info!(key, "subscribed");
        self.subscriptions
            .insert(key.to_string(), subscription.clone());
        Ok(subscription)
    }

    /// Tear down and remove the subscription for a key. Data for the key is
    /// gone before this returns. Returns false if the key was not subscribed.
    pub fn unsubscribe(&self, key: &str) -> bool {
        match self.subscriptions.remove(key) {
            Some((_, subscription)) => {
                subscription.shutdown();
                info!(key, "unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<MomentumSubscription>> {
        self.subscriptions.get(key).map(|s| s.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.subscriptions.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Latest sample for a key, from whichever source produced it.
    pub fn sample(&self, key: &str) -> Option<MomentumSample> {
        self.get(key).and_then(|s| s.sample())
    }

    /// Push channel connection state for a key.
    pub fn connection_state(&self, key: &str) -> Option<ConnectionState> {
        self.get(key).map(|s| s.connection_state())
    }

    /// Whether the key is currently fed by the fallback poller.
    pub fn is_using_fallback(&self, key: &str) -> Option<bool> {
        self.get(key).map(|s| s.is_using_fallback())
    }

    /// Current flash pattern for a key.
    pub fn flash_pattern(&self, key: &str) -> Option<FlashPattern> {
        self.get(key).map(|s| s.flash_pattern())
    }

    /// Force an immediate reconnect of the key's push channel.
    pub fn reconnect(&self, key: &str) -> bool {
        match self.get(key) {
            Some(subscription) => {
                subscription.reconnect();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every subscription, for status reporting.
    pub fn states(&self) -> Vec<SubscriptionState> {
        self.subscriptions
            .iter()
            .map(|entry| entry.value().state())
            .collect()
    }

    /// Tear down every subscription.
    pub fn shutdown_all(&self) {
        let keys: Vec<String> = self
            .subscriptions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.unsubscribe(&key);
        }
    }
}

/// Single-slot key tracker with explicit previous-vs-current state.
///
/// `set_key` is the only mutation: a repeated key is a no-op, a changed key
/// tears the old subscription down fully before the new one exists, and
/// `None` clears the slot entirely.
pub struct KeySlot {
    registry: Arc<SubscriptionRegistry>,
    class: Option<String>,
    current: Mutex<Option<String>>,
}

impl KeySlot {
    pub fn new(registry: Arc<SubscriptionRegistry>, class: Option<String>) -> Self {
        Self {
            registry,
            class,
            current: Mutex::new(None),
        }
    }

    /// Currently tracked key, if any.
    pub fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// Point the slot at a new key (or clear it with `None`).
    pub fn set_key(&self, key: Option<&str>) -> FeedResult<()> {
        let mut current = self.current.lock();
        if current.as_deref() == key {
            return Ok(());
        }

        // The old key's channel, poller and data are gone before the new
        // key's resources are created.
        if let Some(old) = current.take() {
            debug!(old = %old, new = ?key, "key change, tearing down old subscription");
            self.registry.unsubscribe(&old);
        }

        if let Some(new_key) = key {
            self.registry.subscribe(new_key, self.class.as_deref())?;
            *current = Some(new_key.to_string());
        }
        Ok(())
    }
}
