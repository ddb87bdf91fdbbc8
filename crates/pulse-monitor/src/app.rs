//! Application loop.
//!
//! Subscribes the configured games, logs a periodic status report for each
//! subscription and reacts to credential-refresh signals until ctrl-c.

use crate::config::AppConfig;
use crate::error::AppResult;
use pulse_feed::{SubscriptionBuilder, SubscriptionRegistry, SubscriptionState};
use pulse_flash::FlashPattern;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub struct Application {
    config: AppConfig,
    registry: Arc<SubscriptionRegistry>,
    credential_rx: mpsc::Receiver<String>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let (credential_tx, credential_rx) = mpsc::channel(16);

        let builder = SubscriptionBuilder::new(&config.channel_endpoint, &config.poll_endpoint)
            .channel_config(config.channel.clone().into())
            .poller_config(config.fallback.clone().into())
            .generator(config.flash.into())
            .credential_refresh(credential_tx);

        let classes = config
            .classes
            .iter()
            .map(|(name, settings)| (name.clone(), (*settings).into()))
            .collect();

        Ok(Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new(builder, classes)),
            credential_rx,
        })
    }

    /// The live subscription registry.
    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    /// Subscribe the configured games and run until ctrl-c.
    pub async fn run(&mut self) -> AppResult<()> {
        for game in &self.config.games {
            self.registry.subscribe(&game.key, game.class.as_deref())?;
        }
        info!(games = self.config.games.len(), "subscriptions started");

        let mut status_tick =
            tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));

        loop {
            tokio::select! {
                _ = status_tick.tick() => {
                    self.log_status();
                }

                key = self.credential_rx.recv() => {
                    if let Some(key) = key {
                        // Refreshing credentials is the operator's job; the
                        // subscription rests errored until a reconnect.
                        warn!(%key, "credentials rejected, refresh required before reconnect");
                    }
                }

                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(%e, "failed to listen for shutdown signal");
                    }
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.registry.shutdown_all();
        info!("all subscriptions stopped");
        Ok(())
    }

    fn log_status(&self) {
        for state in self.registry.states() {
            let SubscriptionState {
                key,
                connection,
                sample,
                pattern,
                using_fallback,
                error,
            } = state;
            let sample_age_ms = sample.as_ref().map(|s| s.age_ms());
            let pong_age_ms = self
                .registry
                .get(&key)
                .and_then(|s| s.heartbeat_stats().pong_age_ms());
            info!(
                %key,
                status = %connection.status,
                retry_count = connection.retry_count,
                using_fallback,
                sample_age_ms = ?sample_age_ms,
                heartbeat_pong_age_ms = ?pong_age_ms,
                pattern = %pattern_summary(&pattern),
                error = ?error,
                "subscription status"
            );
        }
    }
}

/// Compact `subject:count` rendering of a pattern for status logs.
fn pattern_summary(pattern: &FlashPattern) -> String {
    if pattern.is_empty() {
        return "-".to_string();
    }
    let mut subjects: Vec<&str> = Vec::new();
    for event in pattern.events() {
        if !subjects.contains(&event.subject_id.as_str()) {
            subjects.push(&event.subject_id);
        }
    }
    subjects
        .iter()
        .map(|id| format!("{id}:{}", pattern.count_for(id)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_flash::GeneratorConfig;

    #[test]
    fn test_pattern_summary() {
        assert_eq!(pattern_summary(&FlashPattern::empty()), "-");

        let pattern = FlashPattern::generate(
            &[("home".to_string(), 6.2), ("away".to_string(), 2.1)],
            &GeneratorConfig::default(),
        );
        assert_eq!(pattern_summary(&pattern), "home:7 away:3");
    }

    #[tokio::test]
    async fn test_application_builds_from_default_config() {
        let app = Application::new(AppConfig::default()).unwrap();
        assert!(app.registry().is_empty());
    }
}
