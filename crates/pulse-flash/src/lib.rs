//! Deterministic flash pattern generation.
//!
//! Converts a two-subject momentum pair into a fixed-length, maximally
//! interleaved sequence of timed visual events. Pure computation with no
//! external dependencies; identical input always yields an identical pattern.

pub mod pattern;

pub use pattern::{
    ColorVariant, FlashEvent, FlashPattern, GeneratorConfig, DEFAULT_EVENT_DURATION_MS,
    PATTERN_LENGTH,
};
