//! Poller error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type PollResult<T> = Result<T, PollError>;
