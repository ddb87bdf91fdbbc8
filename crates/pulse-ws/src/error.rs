//! Channel error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection not established within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Abnormal close: code={code}, reason={reason}")]
    AbnormalClose { code: u16, reason: String },

    #[error("Authentication rejected by server (close code {0})")]
    AuthenticationRejected(u16),

    #[error("Retry budget exhausted after {0} attempts")]
    MaxRetriesExceeded(u32),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
