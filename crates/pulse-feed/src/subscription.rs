//! Source arbitration for one subscription key.
//!
//! A `MomentumSubscription` owns the push channel and the fallback poller for
//! one tracked game and merges both into a single view: latest sample, derived
//! flash pattern, connection state and a fallback flag. Consumers never see
//! which source produced a sample.
//!
//! The poller runs exactly while the channel is neither connected nor
//! connecting. Connecting is treated as live so a brief handshake never
//! triggers a poll burst.

use crate::error::{FeedError, FeedResult};
use parking_lot::RwLock;
use pulse_core::{ConnectionState, ConnectionStatus, MomentumSample};
use pulse_fallback::{FallbackPoller, PollerConfig, PollerEvent};
use pulse_flash::{FlashPattern, GeneratorConfig};
use pulse_ws::{ChannelConfig, ChannelEvent, ChannelManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether the fallback poller should be running for a given channel status.
///
/// True exactly for the resting states. While Connecting the channel is still
/// treated as the authoritative source-to-be.
pub fn fallback_should_be_active(status: ConnectionStatus) -> bool {
    !status.is_live()
}

/// Unified view of one subscription, independent of the data source.
#[derive(Debug, Clone)]
pub struct SubscriptionState {
    /// Tracked game key.
    pub key: String,
    /// Push channel connection state.
    pub connection: ConnectionState,
    /// Latest applied sample from either source.
    pub sample: Option<MomentumSample>,
    /// Pattern derived from the latest sample.
    pub pattern: FlashPattern,
    /// True while the poller substitutes for the channel.
    pub using_fallback: bool,
    /// Last surfaced error, cleared when the channel (re)connects.
    pub error: Option<String>,
}

struct Inner {
    connection: ConnectionState,
    sample: Option<MomentumSample>,
    pattern: FlashPattern,
    using_fallback: bool,
    error: Option<String>,
}

/// One tracked game: push channel + fallback poller + merged state.
pub struct MomentumSubscription {
    key: String,
    channel: Arc<ChannelManager>,
    poller: FallbackPoller,
    generator: GeneratorConfig,
    inner: RwLock<Inner>,
    credential_refresh_tx: Option<mpsc::Sender<String>>,
    shutdown_token: CancellationToken,
}

impl std::fmt::Debug for MomentumSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MomentumSubscription")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl MomentumSubscription {
    /// Create the subscription and spawn its channel and arbitration tasks.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        key: String,
        channel_config: ChannelConfig,
        poller_config: PollerConfig,
        generator: GeneratorConfig,
        credential_refresh_tx: Option<mpsc::Sender<String>>,
    ) -> FeedResult<Arc<Self>> {
        let (channel_tx, channel_rx) = mpsc::channel(64);
        let (poller_tx, poller_rx) = mpsc::channel(64);

        let channel = Arc::new(ChannelManager::new(channel_config, channel_tx));
        let poller = FallbackPoller::new(poller_config, poller_tx)?;

        let subscription = Arc::new(Self {
            key,
            channel: channel.clone(),
            poller,
            generator,
            inner: RwLock::new(Inner {
                connection: ConnectionState::new(),
                sample: None,
                pattern: FlashPattern::empty(),
                using_fallback: false,
                error: None,
            }),
            credential_refresh_tx,
            shutdown_token: CancellationToken::new(),
        });

        tokio::spawn(async move { channel.run().await });

        let events = subscription.clone();
        tokio::spawn(async move { events.run_events(channel_rx, poller_rx).await });

        Ok(subscription)
    }

    /// Tracked game key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Latest applied sample, whichever source produced it.
    pub fn sample(&self) -> Option<MomentumSample> {
        self.inner.read().sample.clone()
    }

    /// Push channel connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.read().connection
    }

    /// True while the fallback poller substitutes for the channel.
    pub fn is_using_fallback(&self) -> bool {
        self.inner.read().using_fallback
    }

    /// Pattern derived from the latest sample. Empty until data arrives.
    pub fn flash_pattern(&self) -> FlashPattern {
        self.inner.read().pattern.clone()
    }

    /// Last surfaced error, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    /// Channel heartbeat timing snapshot, for status reporting.
    pub fn heartbeat_stats(&self) -> pulse_ws::HeartbeatStats {
        self.channel.heartbeat_stats()
    }

    /// Full snapshot for status reporting.
    pub fn state(&self) -> SubscriptionState {
        let inner = self.inner.read();
        SubscriptionState {
            key: self.key.clone(),
            connection: inner.connection,
            sample: inner.sample.clone(),
            pattern: inner.pattern.clone(),
            using_fallback: inner.using_fallback,
            error: inner.error.clone(),
        }
    }

    /// Force an immediate channel reconnect, resetting the retry budget.
    pub fn reconnect(&self) {
        info!(key = %self.key, "manual reconnect");
        self.channel.reconnect();
    }

    /// Full teardown: channel, poller and data are gone before this returns.
    /// Idempotent.
    ///
    /// The poller is deactivated and the data cleared under the `inner` write
    /// lock, after the token is cancelled. Every applier arms the poller and
    /// mutates `inner` under the same lock with a token check inside it, so
    /// an event in flight during teardown can neither re-arm the poller nor
    /// restore the cleared data.
    pub fn shutdown(&self) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        info!(key = %self.key, "subscription shutdown");
        self.shutdown_token.cancel();
        self.channel.shutdown();

        let mut inner = self.inner.write();
        self.poller.deactivate();
        inner.connection = inner.connection.with_status(ConnectionStatus::Disconnected);
        inner.sample = None;
        inner.pattern = FlashPattern::empty();
        inner.using_fallback = false;
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Merge channel and poller events into the unified view.
    async fn run_events(
        self: Arc<Self>,
        mut channel_rx: mpsc::Receiver<ChannelEvent>,
        mut poller_rx: mpsc::Receiver<PollerEvent>,
    ) {
        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => return,

                event = channel_rx.recv() => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => return,
                },

                event = poller_rx.recv() => match event {
                    Some(event) => self.handle_poller_event(event),
                    None => return,
                },
            }
        }
    }

    async fn handle_channel_event(&self, event: ChannelEvent) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        match event {
            ChannelEvent::Sample(sample) => self.apply_sample(sample),
            ChannelEvent::Status(state) => self.apply_connection(state),
            ChannelEvent::Error(message) => {
                self.inner.write().error = Some(message);
            }
            ChannelEvent::CredentialRejected => {
                warn!(key = %self.key, "credentials rejected, signalling refresh");
                if let Some(tx) = &self.credential_refresh_tx {
                    if tx.send(self.key.clone()).await.is_err() {
                        debug!("credential refresh receiver dropped");
                    }
                }
            }
        }
    }

    fn handle_poller_event(&self, event: PollerEvent) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        match event {
            // An in-flight fetch that finishes after the channel recovered is
            // still applied; the shape is identical from both sources.
            PollerEvent::Sample(sample) => self.apply_sample(sample),
            PollerEvent::FetchFailed(message) => {
                self.inner.write().error = Some(message);
            }
        }
    }

    fn apply_sample(&self, sample: MomentumSample) {
        let pattern = FlashPattern::from_sample(&sample, &self.generator);
        let mut inner = self.inner.write();
        // Token check under the lock: teardown clears data under the same
        // lock, so a sample in flight cannot land after it.
        if self.shutdown_token.is_cancelled() {
            return;
        }
        debug!(key = %self.key, subjects = sample.team_momentum.len(), "sample applied");
        inner.pattern = pattern;
        inner.sample = Some(sample);
    }

    fn apply_connection(&self, state: ConnectionState) {
        let fallback = fallback_should_be_active(state.status);
        let mut inner = self.inner.write();
        if self.shutdown_token.is_cancelled() {
            return;
        }
        inner.connection = state;
        inner.using_fallback = fallback;
        if state.status == ConnectionStatus::Connected {
            inner.error = None;
        }
        // Armed under the lock: teardown deactivates under the same lock
        // after cancelling the token, so the poller cannot be re-armed once
        // shutdown has run.
        if fallback {
            self.poller.activate();
        } else {
            self.poller.deactivate();
        }
    }
}

/// Named configuration profile binding retry budget and poll cadence.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionClass {
    /// Automatic retry budget for the push channel.
    pub max_retry_attempts: u32,
    /// Poll interval while the channel is down.
    pub poll_interval: Duration,
}

/// Builds per-key subscriptions from endpoint templates and base configs.
///
/// Templates contain a `{key}` placeholder that is substituted with the
/// tracked game key at build time.
#[derive(Clone)]
pub struct SubscriptionBuilder {
    channel_endpoint: String,
    poll_endpoint: String,
    channel_config: ChannelConfig,
    poller_config: PollerConfig,
    generator: GeneratorConfig,
    credential_refresh_tx: Option<mpsc::Sender<String>>,
}

impl SubscriptionBuilder {
    pub fn new(channel_endpoint: impl Into<String>, poll_endpoint: impl Into<String>) -> Self {
        Self {
            channel_endpoint: channel_endpoint.into(),
            poll_endpoint: poll_endpoint.into(),
            channel_config: ChannelConfig::default(),
            poller_config: PollerConfig::default(),
            generator: GeneratorConfig::default(),
            credential_refresh_tx: None,
        }
    }

    /// Base channel config; the url field is overwritten per key.
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    /// Base poller config; the url field is overwritten per key.
    pub fn poller_config(mut self, config: PollerConfig) -> Self {
        self.poller_config = config;
        self
    }

    pub fn generator(mut self, config: GeneratorConfig) -> Self {
        self.generator = config;
        self
    }

    /// Channel carrying the key of any subscription whose credentials were
    /// rejected. The credential holder listens on the other end.
    pub fn credential_refresh(mut self, tx: mpsc::Sender<String>) -> Self {
        self.credential_refresh_tx = Some(tx);
        self
    }

    /// Build and spawn a subscription for `key`, optionally overridden by a
    /// class profile.
    pub fn build(
        &self,
        key: &str,
        class: Option<&SubscriptionClass>,
    ) -> FeedResult<Arc<MomentumSubscription>> {
        let mut channel_config = self.channel_config.clone();
        channel_config.url = substitute_key(&self.channel_endpoint, key)?;

        let mut poller_config = self.poller_config.clone();
        poller_config.url = substitute_key(&self.poll_endpoint, key)?;

        if let Some(class) = class {
            channel_config.max_retry_attempts = class.max_retry_attempts;
            poller_config.poll_interval = class.poll_interval;
        }

        MomentumSubscription::spawn(
            key.to_string(),
            channel_config,
            poller_config,
            self.generator,
            self.credential_refresh_tx.clone(),
        )
    }
}

fn substitute_key(template: &str, key: &str) -> FeedResult<String> {
    if !template.contains("{key}") {
        return Err(FeedError::InvalidEndpoint(format!(
            "missing {{key}} placeholder: {template}"
        )));
    }
    Ok(template.replace("{key}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_active_exactly_in_resting_states() {
        assert!(!fallback_should_be_active(ConnectionStatus::Connecting));
        assert!(!fallback_should_be_active(ConnectionStatus::Connected));
        assert!(fallback_should_be_active(ConnectionStatus::Disconnected));
        assert!(fallback_should_be_active(ConnectionStatus::Errored));
    }

    #[test]
    fn test_substitute_key() {
        let url = substitute_key("wss://feed.example/momentum/{key}", "game-1").unwrap();
        assert_eq!(url, "wss://feed.example/momentum/game-1");
        assert!(substitute_key("wss://feed.example/momentum", "game-1").is_err());
    }

    #[tokio::test]
    async fn test_builder_applies_class_overrides() {
        let builder = SubscriptionBuilder::new(
            "ws://127.0.0.1:1/ch/{key}",
            "http://127.0.0.1:1/poll/{key}",
        );
        let class = SubscriptionClass {
            max_retry_attempts: 5,
            poll_interval: Duration::from_secs(45),
        };
        let subscription = builder.build("g1", Some(&class)).unwrap();
        assert_eq!(subscription.key(), "g1");
        subscription.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_clears_data_synchronously() {
        let builder = SubscriptionBuilder::new(
            "ws://127.0.0.1:1/ch/{key}",
            "http://127.0.0.1:1/poll/{key}",
        );
        let subscription = builder.build("g1", None).unwrap();
        subscription.shutdown();
        subscription.shutdown();

        assert!(subscription.is_shutdown());
        assert!(subscription.sample().is_none());
        assert!(subscription.flash_pattern().is_empty());
        assert!(!subscription.is_using_fallback());
        assert_eq!(
            subscription.connection_state().status,
            ConnectionStatus::Disconnected
        );
    }
}
