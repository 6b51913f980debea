//! Transport state and the events a project publishes to listeners.

use serde::{Deserialize, Serialize};

use crate::{ClipId, TimeSignature, TrackId};

/// Shortest loop region, in beats.
pub const MIN_LOOP_LENGTH: f64 = 1.0;

/// Playback state of the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl TransportState {
    /// Whether the timeline is advancing.
    pub fn is_rolling(self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }
}

/// A loop region in beats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
}

impl LoopRegion {
    /// Build a region, forcing `start >= 0` and `end >= start + MIN_LOOP_LENGTH`.
    pub fn new(start: f64, end: f64, enabled: bool) -> Self {
        let start = if start.is_finite() { start.max(0.0) } else { 0.0 };
        let end = if end.is_finite() { end } else { start };
        Self {
            start,
            end: end.max(start + MIN_LOOP_LENGTH),
            enabled,
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Map a beat past `end` back into the region.
    pub fn wrap(&self, beat: f64) -> f64 {
        if beat < self.end {
            return beat;
        }
        self.start + (beat - self.end).rem_euclid(self.length())
    }
}

impl Default for LoopRegion {
    fn default() -> Self {
        Self::new(0.0, 16.0, false)
    }
}

/// Something observable happened in a project.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectEvent {
    Play { position: f64 },
    Pause { position: f64 },
    Stop { position: f64 },
    Record { position: f64 },
    /// Periodic position report while rolling
    Tick { position: f64 },
    BpmChange { bpm: f64 },
    LoopChange(LoopRegion),
    TimeSignatureChange(TimeSignature),
    MetronomeChange { enabled: bool },
    TrackAdded(TrackId),
    TrackRemoved(TrackId),
    ClipAdded(ClipId),
    ClipRemoved(ClipId),
}

/// Discriminant of [`ProjectEvent`], used to subscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Play,
    Pause,
    Stop,
    Record,
    Tick,
    BpmChange,
    LoopChange,
    TimeSignatureChange,
    MetronomeChange,
    TrackAdded,
    TrackRemoved,
    ClipAdded,
    ClipRemoved,
}

impl ProjectEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProjectEvent::Play { .. } => EventKind::Play,
            ProjectEvent::Pause { .. } => EventKind::Pause,
            ProjectEvent::Stop { .. } => EventKind::Stop,
            ProjectEvent::Record { .. } => EventKind::Record,
            ProjectEvent::Tick { .. } => EventKind::Tick,
            ProjectEvent::BpmChange { .. } => EventKind::BpmChange,
            ProjectEvent::LoopChange(_) => EventKind::LoopChange,
            ProjectEvent::TimeSignatureChange(_) => EventKind::TimeSignatureChange,
            ProjectEvent::MetronomeChange { .. } => EventKind::MetronomeChange,
            ProjectEvent::TrackAdded(_) => EventKind::TrackAdded,
            ProjectEvent::TrackRemoved(_) => EventKind::TrackRemoved,
            ProjectEvent::ClipAdded(_) => EventKind::ClipAdded,
            ProjectEvent::ClipRemoved(_) => EventKind::ClipRemoved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_region_enforces_min_length() {
        let r = LoopRegion::new(4.0, 4.25, true);
        assert_eq!(r.end, 5.0);
        let r = LoopRegion::new(-2.0, 8.0, false);
        assert_eq!(r.start, 0.0);
        assert_eq!(r.length(), 8.0);
    }

    #[test]
    fn wrap_keeps_overshoot() {
        let r = LoopRegion::new(0.0, 4.0, true);
        assert_eq!(r.wrap(3.5), 3.5);
        assert_eq!(r.wrap(4.25), 0.25);
        assert_eq!(r.wrap(9.0), 1.0);
    }

    #[test]
    fn rolling_states() {
        assert!(TransportState::Playing.is_rolling());
        assert!(TransportState::Recording.is_rolling());
        assert!(!TransportState::Paused.is_rolling());
        assert!(!TransportState::Stopped.is_rolling());
    }
}
