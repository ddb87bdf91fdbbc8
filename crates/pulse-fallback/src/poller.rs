//! Periodic pull-based momentum source.
//!
//! Active only while the push channel is not live. One fetch fires
//! immediately on activation, then the loop repeats on a fixed interval
//! until deactivated. A fetch that is in flight when the poller is
//! deactivated still delivers its result, but the loop does not re-arm.

use crate::error::{PollError, PollResult};
use parking_lot::Mutex;
use pulse_core::MomentumSample;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default timeout for a single poll request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poller configuration for one subscription key.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Per-key poll endpoint returning the momentum sample wire shape.
    pub url: String,
    /// Interval between fetches (typically 30–60 s per subscription class).
    pub poll_interval: Duration,
    /// Timeout for a single request.
    pub request_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval: Duration::from_secs(30),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Event emitted by the polling loop.
#[derive(Debug, Clone)]
pub enum PollerEvent {
    /// Fresh sample from the poll endpoint.
    Sample(MomentumSample),
    /// A fetch failed; non-terminal, the next tick tries again.
    FetchFailed(String),
}

/// Pull-based fallback source for one subscription key.
pub struct FallbackPoller {
    config: PollerConfig,
    client: Client,
    events_tx: mpsc::Sender<PollerEvent>,
    /// Token of the currently running loop, if any.
    active: Mutex<Option<CancellationToken>>,
}

impl FallbackPoller {
    /// Create a new poller. Fails only if the HTTP client cannot be built.
    pub fn new(config: PollerConfig, events_tx: mpsc::Sender<PollerEvent>) -> PollResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PollError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            events_tx,
            active: Mutex::new(None),
        })
    }

    /// Whether the polling loop is currently armed.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Start polling: one fetch immediately, then on the fixed interval.
    /// A no-op if the loop is already running.
    pub fn activate(&self) {
        let mut active = self.active.lock();
        if active.is_some() {
            return;
        }

        let token = CancellationToken::new();
        *active = Some(token.clone());
        info!(url = %self.config.url, interval_s = self.config.poll_interval.as_secs(), "fallback poller activated");

        let client = self.client.clone();
        let config = self.config.clone();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            loop {
                // The fetch is awaited to completion before the cancellation
                // check, so an in-flight result at deactivation still lands.
                let event = match fetch_sample(&client, &config.url).await {
                    Ok(sample) => PollerEvent::Sample(sample),
                    Err(e) => {
                        warn!(%e, "fallback fetch failed, retrying on next tick");
                        PollerEvent::FetchFailed(e.to_string())
                    }
                };
                if events_tx.send(event).await.is_err() {
                    debug!("poller event receiver dropped");
                    return;
                }

                if token.is_cancelled() {
                    return;
                }
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        });
    }

    /// Stop scheduling further fetches. Idempotent.
    pub fn deactivate(&self) {
        if let Some(token) = self.active.lock().take() {
            info!("fallback poller deactivated");
            token.cancel();
        }
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        if let Some(token) = self.active.get_mut().take() {
            token.cancel();
        }
    }
}

/// Fetch one sample from the poll endpoint.
async fn fetch_sample(client: &Client, url: &str) -> PollResult<MomentumSample> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PollError::FetchFailed(format!("HTTP request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PollError::FetchFailed(format!("HTTP {status}: {body}")));
    }

    response
        .json::<MomentumSample>()
        .await
        .map_err(|e| PollError::InvalidResponse(format!("Failed to parse sample: {e}")))
}
