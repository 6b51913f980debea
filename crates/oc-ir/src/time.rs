//! Beat/second conversion and meter.
//!
//! Beats are the universal timeline coordinate. Seconds only appear when a
//! beat position is mapped onto the audio clock at a given tempo.

use serde::{Deserialize, Serialize};

/// Slowest tempo the engine accepts.
pub const MIN_BPM: f64 = 20.0;

/// Fastest tempo the engine accepts.
pub const MAX_BPM: f64 = 999.0;

/// Tempo of a new project.
pub const DEFAULT_BPM: f64 = 120.0;

/// Clamp a tempo into `[MIN_BPM, MAX_BPM]`. Non-finite input falls back to
/// the default tempo.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

pub fn beats_per_second(bpm: f64) -> f64 {
    clamp_bpm(bpm) / 60.0
}

/// Convert a beat span to seconds at `bpm`.
pub fn beats_to_seconds(beats: f64, bpm: f64) -> f64 {
    beats / beats_per_second(bpm)
}

/// Convert seconds to a beat span at `bpm`.
pub fn seconds_to_beats(seconds: f64, bpm: f64) -> f64 {
    seconds * beats_per_second(bpm)
}

/// Musical meter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats in one bar (numerator, at least 1)
    pub beats_per_bar: u8,
    /// Note value of one beat (denominator, power of two)
    pub beat_unit: u8,
}

impl TimeSignature {
    /// Create a time signature, clamping the numerator to at least 1 and
    /// rounding the denominator up to a power of two in `1..=32`.
    pub fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        Self {
            beats_per_bar: beats_per_bar.max(1),
            beat_unit: beat_unit.clamp(1, 32).next_power_of_two(),
        }
    }

    /// Whether the whole beat `beat` (counted from 0) starts a bar.
    pub fn is_downbeat(&self, beat: u64) -> bool {
        beat % self.beats_per_bar.max(1) as u64 == 0
    }

    /// Bar index (from 0) containing `beat`.
    pub fn bar_of(&self, beat: f64) -> u64 {
        (beat.max(0.0) / self.beats_per_bar.max(1) as f64).floor() as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats_per_bar: 4, beat_unit: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_second_per_beat_at_120() {
        assert_eq!(beats_to_seconds(8.0, 120.0), 4.0);
        assert_eq!(seconds_to_beats(4.0, 120.0), 8.0);
    }

    #[test]
    fn non_positive_bpm_is_clamped() {
        assert_eq!(clamp_bpm(0.0), MIN_BPM);
        assert_eq!(clamp_bpm(-40.0), MIN_BPM);
        assert_eq!(clamp_bpm(f64::NAN), DEFAULT_BPM);
        assert_eq!(clamp_bpm(5000.0), MAX_BPM);
    }

    #[test]
    fn time_signature_sanitizes() {
        let ts = TimeSignature::new(0, 3);
        assert_eq!(ts.beats_per_bar, 1);
        assert_eq!(ts.beat_unit, 4);
    }

    #[test]
    fn downbeats_follow_numerator() {
        let ts = TimeSignature::new(3, 4);
        assert!(ts.is_downbeat(0));
        assert!(!ts.is_downbeat(1));
        assert!(ts.is_downbeat(3));
        assert_eq!(ts.bar_of(7.5), 2);
    }
}
