//! Push channel manager.
//!
//! Owns one WebSocket connection per subscription key. Handles the handshake
//! timeout, the liveness heartbeat, close-code classification and bounded
//! exponential-backoff reconnection. All message handling for a key runs on
//! the single owning task, so subscription state is never mutated by two
//! messages at once.

use crate::error::{ChannelError, ChannelResult};
use crate::heartbeat::Heartbeat;
use crate::message::{
    classify_close_code, ClientMessage, CloseClass, ServerMessage, DEFAULT_AUTH_REJECTED_CODE,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use pulse_core::{ConnectionState, ConnectionStatus, MomentumSample};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Channel configuration for one subscription key.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Per-key WebSocket endpoint.
    pub url: String,
    /// The handshake must complete within this window; a stalled open counts
    /// as one failed attempt on the same retry path as an abnormal close.
    pub connect_timeout: Duration,
    /// Liveness ping cadence while connected.
    pub heartbeat_interval: Duration,
    /// Automatic retry budget after retry-eligible failures.
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Cap for exponential backoff.
    pub retry_max_delay: Duration,
    /// Application close code meaning the credentials were rejected.
    pub auth_rejected_code: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            max_retry_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_secs(30),
            auth_rejected_code: DEFAULT_AUTH_REJECTED_CODE,
        }
    }
}

/// Event emitted by the channel task.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Fresh sample from the push channel.
    Sample(MomentumSample),
    /// Connection state changed.
    Status(ConnectionState),
    /// Non-fatal error; recovery (or the retry loop) is still running.
    Error(String),
    /// The server rejected credentials; the credential holder must refresh.
    CredentialRejected,
}

#[derive(Debug)]
enum ChannelCommand {
    Reconnect,
}

/// Outcome of one connection session.
enum SessionEnd {
    /// Close code 1000/1001; no retry.
    Intentional { code: u16, reason: String },
    /// Credentials rejected; terminal until manual reconnect.
    AuthRejected { code: u16 },
    /// Retry-eligible failure.
    Retryable(ChannelError),
    /// Manual reconnect requested; connect again immediately.
    ManualReconnect,
    /// Shutdown requested.
    Shutdown,
}

/// Push channel manager for a single subscription key.
pub struct ChannelManager {
    config: ChannelConfig,
    state: Arc<RwLock<ConnectionState>>,
    heartbeat: Heartbeat,
    events_tx: mpsc::Sender<ChannelEvent>,
    command_tx: mpsc::Sender<ChannelCommand>,
    /// Consumed exclusively by `run`.
    command_rx: TokioMutex<mpsc::Receiver<ChannelCommand>>,
    shutdown_token: CancellationToken,
}

impl ChannelManager {
    /// Create a new channel manager. Call `run` on a dedicated task.
    pub fn new(config: ChannelConfig, events_tx: mpsc::Sender<ChannelEvent>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(4);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::new())),
            heartbeat: Heartbeat::new(),
            events_tx,
            command_tx,
            command_rx: TokioMutex::new(command_rx),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.read().status
    }

    /// Heartbeat timing snapshot.
    pub fn heartbeat_stats(&self) -> crate::heartbeat::HeartbeatStats {
        self.heartbeat.stats()
    }

    /// Request an immediate reconnect, bypassing any pending backoff delay
    /// and resetting the retry counter. Safe to call in any state; repeated
    /// calls coalesce — there is never more than one live channel.
    pub fn reconnect(&self) {
        debug!("manual reconnect requested");
        let _ = self.command_tx.try_send(ChannelCommand::Reconnect);
    }

    /// Idempotent teardown: cancels the task's timers and socket and marks
    /// the channel disconnected before returning.
    pub fn shutdown(&self) {
        info!("channel shutdown requested");
        self.shutdown_token.cancel();
        let mut state = self.state.write();
        *state = state.with_status(ConnectionStatus::Disconnected);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and keep the channel alive until shutdown.
    ///
    /// Drives the full lifecycle: connecting → connected → disconnected →
    /// (bounded retries) → errored, with manual reconnect recovering from
    /// any resting state.
    pub async fn run(&self) {
        let mut command_rx = self.command_rx.lock().await;

        loop {
            if self.is_shutdown() {
                self.transition(ConnectionStatus::Disconnected).await;
                return;
            }

            // Coalesce reconnect requests issued while we were between
            // sessions; we are about to connect anyway.
            while command_rx.try_recv().is_ok() {}

            self.transition(ConnectionStatus::Connecting).await;

            match self.run_session(&mut command_rx).await {
                SessionEnd::Shutdown => {
                    self.transition(ConnectionStatus::Disconnected).await;
                    return;
                }
                SessionEnd::ManualReconnect => {
                    self.reset_retries();
                }
                SessionEnd::Intentional { code, reason } => {
                    info!(code, %reason, "channel closed intentionally, not retrying");
                    self.transition(ConnectionStatus::Disconnected).await;
                    if !self.wait_for_reconnect(&mut command_rx).await {
                        return;
                    }
                    self.reset_retries();
                }
                SessionEnd::AuthRejected { code } => {
                    error!(code, "authentication rejected, credential refresh required");
                    self.emit(ChannelEvent::CredentialRejected).await;
                    self.emit(ChannelEvent::Error(
                        ChannelError::AuthenticationRejected(code).to_string(),
                    ))
                    .await;
                    self.transition(ConnectionStatus::Errored).await;
                    if !self.wait_for_reconnect(&mut command_rx).await {
                        return;
                    }
                    self.reset_retries();
                }
                SessionEnd::Retryable(err) => {
                    warn!(%err, "channel session failed");
                    self.emit(ChannelEvent::Error(err.to_string())).await;
                    if !self.backoff_or_halt(&mut command_rx).await {
                        return;
                    }
                }
            }
        }
    }

    /// Increment the retry counter and either sleep the backoff delay or,
    /// when the budget is exhausted, rest in `Errored` until a manual
    /// reconnect. Returns false when shutdown was requested.
    async fn backoff_or_halt(&self, command_rx: &mut mpsc::Receiver<ChannelCommand>) -> bool {
        let attempt = {
            let mut state = self.state.write();
            state.retry_count += 1;
            state.retry_count
        };

        if attempt > self.config.max_retry_attempts {
            error!(
                attempts = self.config.max_retry_attempts,
                "retry budget exhausted"
            );
            self.emit(ChannelEvent::Error(
                ChannelError::MaxRetriesExceeded(self.config.max_retry_attempts).to_string(),
            ))
            .await;
            self.transition(ConnectionStatus::Errored).await;
            if !self.wait_for_reconnect(command_rx).await {
                return false;
            }
            self.reset_retries();
            return true;
        }

        let delay = compute_backoff_delay(
            attempt,
            self.config.retry_base_delay,
            self.config.retry_max_delay,
        );
        {
            let mut state = self.state.write();
            state.status = ConnectionStatus::Disconnected;
            state.next_retry_at = Some(
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
            );
        }
        self.emit_status().await;
        warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting after backoff");

        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.shutdown_token.cancelled() => false,
            cmd = command_rx.recv() => match cmd {
                // Manual reconnect cancels the pending retry timer and
                // connects immediately with a fresh counter.
                Some(ChannelCommand::Reconnect) => {
                    self.reset_retries();
                    true
                }
                None => false,
            },
        }
    }

    /// Rest until a manual reconnect arrives. Returns false on shutdown.
    async fn wait_for_reconnect(&self, command_rx: &mut mpsc::Receiver<ChannelCommand>) -> bool {
        tokio::select! {
            () = self.shutdown_token.cancelled() => false,
            cmd = command_rx.recv() => matches!(cmd, Some(ChannelCommand::Reconnect)),
        }
    }

    /// One connection attempt plus its message loop.
    async fn run_session(&self, command_rx: &mut mpsc::Receiver<ChannelCommand>) -> SessionEnd {
        info!(url = %self.config.url, "connecting to channel");

        let connect = connect_async_tls_with_config(&self.config.url, None, true, None);
        let ws_stream = tokio::select! {
            () = self.shutdown_token.cancelled() => return SessionEnd::Shutdown,
            result = tokio::time::timeout(self.config.connect_timeout, connect) => match result {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => return SessionEnd::Retryable(e.into()),
                Err(_elapsed) => {
                    return SessionEnd::Retryable(ChannelError::ConnectionTimeout(
                        self.config.connect_timeout,
                    ))
                }
            },
        };

        let (mut write, mut read) = ws_stream.split();

        {
            let mut state = self.state.write();
            *state = ConnectionState {
                status: ConnectionStatus::Connected,
                retry_count: 0,
                next_retry_at: None,
            };
        }
        self.emit_status().await;
        info!("channel connected");

        // Ask for a fresh sample right away rather than waiting for the
        // server's next scheduled push.
        if let Err(e) = send_client(&mut write, ClientMessage::RequestUpdate).await {
            return SessionEnd::Retryable(e);
        }

        self.heartbeat.reset();
        let mut heartbeat_tick = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(?e, "close frame not delivered during shutdown");
                    }
                    return SessionEnd::Shutdown;
                }

                cmd = command_rx.recv() => match cmd {
                    Some(ChannelCommand::Reconnect) => {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::ManualReconnect;
                    }
                    None => return SessionEnd::Shutdown,
                },

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return SessionEnd::Retryable(e.into());
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        self.heartbeat.record_pong();
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        warn!(code, %reason, "channel closed by server");
                        return match classify_close_code(code, self.config.auth_rejected_code) {
                            CloseClass::Intentional => SessionEnd::Intentional { code, reason },
                            CloseClass::AuthRejected => SessionEnd::AuthRejected { code },
                            CloseClass::Retryable => {
                                SessionEnd::Retryable(ChannelError::AbnormalClose { code, reason })
                            }
                        };
                    }
                    Some(Err(e)) => {
                        // Surface as non-fatal; the session end below drives
                        // the retry decision, not this signal.
                        self.emit(ChannelEvent::Error(e.to_string())).await;
                        return SessionEnd::Retryable(e.into());
                    }
                    None => {
                        return SessionEnd::Retryable(ChannelError::AbnormalClose {
                            code: 1006,
                            reason: "stream ended".to_string(),
                        });
                    }
                    _ => {}
                },

                _ = heartbeat_tick.tick() => {
                    if let Err(e) = send_client(&mut write, ClientMessage::Ping).await {
                        return SessionEnd::Retryable(e);
                    }
                    self.heartbeat.record_ping();
                    debug!("sent heartbeat ping");
                }
            }
        }
    }

    /// Handle one text frame. Parse failures never close the connection.
    async fn handle_text(&self, text: &str) {
        let msg: ServerMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%e, "unparseable channel message, connection survives");
                return;
            }
        };

        match msg {
            ServerMessage::Data { data, .. } => {
                self.emit(ChannelEvent::Sample(data)).await;
            }
            ServerMessage::Error { error } => {
                warn!(%error, "server error frame, channel stays open");
                self.emit(ChannelEvent::Error(error)).await;
            }
            ServerMessage::Heartbeat { .. } => {
                self.heartbeat.record_server_beat();
                debug!("server heartbeat");
            }
            ServerMessage::Unknown => {
                debug!("ignoring unrecognized channel message type");
            }
        }
    }

    async fn transition(&self, status: ConnectionStatus) {
        {
            let mut state = self.state.write();
            *state = state.with_status(status);
        }
        self.emit_status().await;
    }

    fn reset_retries(&self) {
        let mut state = self.state.write();
        state.retry_count = 0;
        state.next_retry_at = None;
    }

    async fn emit_status(&self) {
        let state = *self.state.read();
        self.emit(ChannelEvent::Status(state)).await;
    }

    async fn emit(&self, event: ChannelEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("channel event receiver dropped");
        }
    }
}

async fn send_client(write: &mut WsSink, msg: ClientMessage) -> ChannelResult<()> {
    let text = serde_json::to_string(&msg)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

/// Exponential backoff delay: `min(base × 2^(attempt-1), max)`.
///
/// attempt=1 → base, attempt=2 → 2×base, attempt=3 → 4×base, capped.
pub fn compute_backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay_ms = (base.as_millis() as u64).saturating_mul(1u64 << exponent);
    Duration::from_millis(delay_ms).min(max)
}
