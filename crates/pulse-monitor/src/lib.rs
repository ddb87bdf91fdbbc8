//! Momentum feed monitor.
//!
//! Binary crate wiring: configuration, logging and the application loop that
//! keeps the configured subscriptions alive and reports their status.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
