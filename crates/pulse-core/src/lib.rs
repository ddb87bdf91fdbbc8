//! Core domain types for the pulse momentum feed.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `MomentumSample`: a two-subject momentum snapshot with freshness timestamp
//! - `ConnectionStatus` / `ConnectionState`: per-subscription channel state
//!   with retry bookkeeping

pub mod types;

pub use types::{ConnectionState, ConnectionStatus, MomentumSample, COMPARISON_SUBJECTS};
