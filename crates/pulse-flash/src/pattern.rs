//! Flash pattern generator.
//!
//! A pattern is one display cycle: ten timed events split between the two
//! subjects in proportion to their momentum share. Slots are assigned to
//! whichever subject is furthest behind its proportional target, which
//! interleaves the subjects instead of clustering one side's events.

use pulse_core::{MomentumSample, COMPARISON_SUBJECTS};
use serde::{Deserialize, Serialize};

/// Events per display cycle.
pub const PATTERN_LENGTH: usize = 10;

/// Default duration of a single flash event.
pub const DEFAULT_EVENT_DURATION_MS: u64 = 500;

/// Color variant for a flash event.
///
/// Consecutive events of the same subject alternate variants so repeated
/// assignments remain visually distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorVariant {
    Primary,
    Secondary,
}

impl ColorVariant {
    fn toggled(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

/// One timed visual event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashEvent {
    /// Subject this event belongs to.
    pub subject_id: String,
    /// Shade to render.
    pub color_variant: ColorVariant,
    /// Event duration in milliseconds.
    pub duration_ms: u64,
}

/// Generator tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Duration of each event in milliseconds.
    pub event_duration_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            event_duration_ms: DEFAULT_EVENT_DURATION_MS,
        }
    }
}

/// A fixed-length ordered sequence of flash events for one display cycle.
///
/// Empty when the input is not a valid two-subject comparison.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlashPattern {
    events: Vec<FlashEvent>,
}

impl FlashPattern {
    /// An empty pattern (no renderable cycle).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Generate a pattern from exactly two `(subject, momentum)` entries.
    ///
    /// Anything other than two entries, non-finite values, or a non-positive
    /// total yields an empty pattern. Entry order matters: rounding remainder
    /// and ratio ties favor the first entry.
    pub fn generate(subjects: &[(String, f64)], config: &GeneratorConfig) -> Self {
        if subjects.len() != COMPARISON_SUBJECTS {
            return Self::empty();
        }
        let (id1, v1) = (&subjects[0].0, subjects[0].1);
        let (id2, v2) = (&subjects[1].0, subjects[1].1);
        if !v1.is_finite() || !v2.is_finite() || v1 < 0.0 || v2 < 0.0 {
            return Self::empty();
        }

        let total = v1 + v2;
        if total <= 0.0 {
            return Self::empty();
        }

        let share1 = v1 / total;
        let count1 = (share1 * PATTERN_LENGTH as f64).round() as usize;
        let count1 = count1.min(PATTERN_LENGTH);
        let count2 = PATTERN_LENGTH - count1;

        let ids = [id1.as_str(), id2.as_str()];
        let counts = [count1, count2];
        let mut assigned = [0usize; 2];
        let mut variants = [ColorVariant::Primary; 2];

        let mut events = Vec::with_capacity(PATTERN_LENGTH);
        for _ in 0..PATTERN_LENGTH {
            let pick = next_slot(&assigned, &counts);
            events.push(FlashEvent {
                subject_id: ids[pick].to_string(),
                color_variant: variants[pick],
                duration_ms: config.event_duration_ms,
            });
            variants[pick] = variants[pick].toggled();
            assigned[pick] += 1;
        }

        Self { events }
    }

    /// Generate a pattern from a sample's team entries.
    ///
    /// Subject order follows the sample's deterministic entry order.
    pub fn from_sample(sample: &MomentumSample, config: &GeneratorConfig) -> Self {
        Self::generate(&sample.team_entries(), config)
    }

    /// Events in display order.
    pub fn events(&self) -> &[FlashEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events assigned to the given subject.
    pub fn count_for(&self, subject_id: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .count()
    }
}

/// Pick the next slot: the subject furthest behind its proportional target.
///
/// Compares `assigned/count` ratios; the smaller ratio goes next, ties favor
/// subject 1. A subject with a zero count never receives a slot.
fn next_slot(assigned: &[usize; 2], counts: &[usize; 2]) -> usize {
    if counts[0] == 0 {
        return 1;
    }
    if counts[1] == 0 {
        return 0;
    }
    let r1 = assigned[0] as f64 / counts[0] as f64;
    let r2 = assigned[1] as f64 / counts[1] as f64;
    if r1 <= r2 {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(v1: f64, v2: f64) -> Vec<(String, f64)> {
        vec![("one".to_string(), v1), ("two".to_string(), v2)]
    }

    fn generate(v1: f64, v2: f64) -> FlashPattern {
        FlashPattern::generate(&pair(v1, v2), &GeneratorConfig::default())
    }

    #[test]
    fn test_pattern_length_fixed() {
        for (v1, v2) in [(1.0, 1.0), (6.2, 2.1), (0.1, 99.9), (5.0, 0.0)] {
            assert_eq!(generate(v1, v2).len(), PATTERN_LENGTH, "({v1},{v2})");
        }
    }

    #[test]
    fn test_proportional_counts() {
        // share1 = 6.2/8.3 = 0.747 -> round(7.47) = 7 events for subject 1.
        let pattern = generate(6.2, 2.1);
        assert_eq!(pattern.count_for("one"), 7);
        assert_eq!(pattern.count_for("two"), 3);
    }

    #[test]
    fn test_deterministic() {
        let a = generate(6.2, 2.1);
        let b = generate(6.2, 2.1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_interleaving_not_clustered() {
        let pattern = generate(6.2, 2.1);
        // Subject 2's 3 events must not be consecutive at either end; the
        // ratio rule spreads them through the cycle.
        let positions: Vec<usize> = pattern
            .events()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.subject_id == "two")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 3);
        assert!(positions.windows(2).all(|w| w[1] - w[0] > 1));
    }

    #[test]
    fn test_tie_favors_subject_one() {
        let pattern = generate(3.0, 3.0);
        assert_eq!(pattern.count_for("one"), 5);
        assert_eq!(pattern.count_for("two"), 5);
        // Even split alternates strictly, starting with subject 1.
        assert_eq!(pattern.events()[0].subject_id, "one");
        assert_eq!(pattern.events()[1].subject_id, "two");
    }

    #[test]
    fn test_color_alternates_per_subject() {
        let pattern = generate(6.2, 2.1);
        for id in ["one", "two"] {
            let variants: Vec<ColorVariant> = pattern
                .events()
                .iter()
                .filter(|e| e.subject_id == id)
                .map(|e| e.color_variant)
                .collect();
            assert_eq!(variants[0], ColorVariant::Primary);
            for w in variants.windows(2) {
                assert_ne!(w[0], w[1]);
            }
        }
    }

    #[test]
    fn test_zero_count_subject() {
        // share1 rounds to 10; subject 2 gets nothing, subject 1 alternates.
        let pattern = generate(100.0, 0.1);
        assert_eq!(pattern.count_for("one"), PATTERN_LENGTH);
        assert_eq!(pattern.events()[0].color_variant, ColorVariant::Primary);
        assert_eq!(pattern.events()[1].color_variant, ColorVariant::Secondary);
    }

    #[test]
    fn test_invalid_input_empty() {
        let config = GeneratorConfig::default();
        assert!(FlashPattern::generate(&[], &config).is_empty());
        assert!(FlashPattern::generate(&[("only".to_string(), 1.0)], &config).is_empty());
        assert!(generate(0.0, 0.0).is_empty());
        assert!(generate(f64::NAN, 1.0).is_empty());
        assert!(generate(-1.0, 2.0).is_empty());
    }

    #[test]
    fn test_event_duration_tunable() {
        let config = GeneratorConfig {
            event_duration_ms: 250,
        };
        let pattern = FlashPattern::generate(&pair(1.0, 1.0), &config);
        assert!(pattern.events().iter().all(|e| e.duration_ms == 250));
    }

    #[test]
    fn test_from_sample_uses_lexicographic_order() {
        let json = r#"{"teamMomentum":{"home":6.2,"away":2.1}}"#;
        let sample: pulse_core::MomentumSample = serde_json::from_str(json).unwrap();
        let pattern = FlashPattern::from_sample(&sample, &GeneratorConfig::default());
        // "away" sorts first, so it is subject 1 with share 2.1/8.3 -> 3 slots.
        assert_eq!(pattern.count_for("away"), 3);
        assert_eq!(pattern.count_for("home"), 7);
    }
}
