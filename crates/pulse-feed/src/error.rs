//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Unknown subscription class: {0}")]
    UnknownClass(String),

    #[error("Invalid endpoint template: {0}")]
    InvalidEndpoint(String),

    #[error(transparent)]
    Poller(#[from] pulse_fallback::PollError),
}

pub type FeedResult<T> = Result<T, FeedError>;
