use serde::{Deserialize, Serialize};

use crate::NoteId;

/// A single note inside a MIDI clip.
///
/// `start` and `duration` are in beats relative to the clip origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiNote {
    id: NoteId,
    /// MIDI note number (0-127)
    pub pitch: u8,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    /// Clip-relative start in beats
    pub start: f64,
    /// Length in beats
    pub duration: f64,
    /// MIDI channel (0-15)
    pub channel: u8,
}

impl MidiNote {
    /// Create a note with a fresh id on channel 0.
    pub fn new(pitch: u8, velocity: u8, start: f64, duration: f64) -> Self {
        let mut note = Self {
            id: NoteId::new(),
            pitch,
            velocity,
            start,
            duration,
            channel: 0,
        };
        note.sanitize();
        note
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel.min(15);
        self
    }

    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Clip-relative end in beats.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Same note content under a new id.
    pub(crate) fn with_fresh_id(&self) -> Self {
        Self {
            id: NoteId::new(),
            ..self.clone()
        }
    }

    /// Force every field back into its valid range.
    pub(crate) fn sanitize(&mut self) {
        self.pitch = self.pitch.min(127);
        self.velocity = self.velocity.min(127);
        self.channel = self.channel.min(15);
        self.start = if self.start.is_finite() { self.start.max(0.0) } else { 0.0 };
        self.duration = if self.duration.is_finite() {
            self.duration.max(0.0)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_fields() {
        let n = MidiNote::new(200, 255, -1.0, -0.5).with_channel(40);
        assert_eq!(n.pitch, 127);
        assert_eq!(n.velocity, 127);
        assert_eq!(n.start, 0.0);
        assert_eq!(n.duration, 0.0);
        assert_eq!(n.channel, 15);
    }

    #[test]
    fn fresh_id_keeps_content() {
        let n = MidiNote::new(60, 100, 1.0, 0.5);
        let m = n.with_fresh_id();
        assert_ne!(n.id(), m.id());
        assert_eq!(n.pitch, m.pitch);
        assert_eq!(n.end(), m.end());
    }
}
