//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error(transparent)]
    Feed(#[from] pulse_feed::FeedError),
}

pub type AppResult<T> = Result<T, AppError>;
