//! Voice: one sounding note or sample on a track.

use oc_ir::{ClipId, NoteId};
use slotmap::new_key_type;

use crate::graph::NodeId;

new_key_type! {
    /// Handle to a voice in a track's active-voice table.
    pub struct VoiceId;
}

/// Voice lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceState {
    /// Registered at scheduling time, waiting for its start event.
    #[default]
    Pending,
    /// Nodes built and scheduled on the audio clock.
    Active,
    /// An explicit stop moved the release to an earlier time.
    Releasing,
}

/// What a voice plays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceSource {
    Note { pitch: u8, velocity: u8 },
    Sample { clip: ClipId },
}

/// Graph nodes owned by a voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceNodes {
    /// Oscillator or buffer source
    pub source: NodeId,
    pub filter: Option<NodeId>,
    /// Envelope gain feeding the track input
    pub amp: NodeId,
}

impl VoiceNodes {
    pub fn iter(&self) -> impl Iterator<Item = NodeId> {
        [Some(self.source), self.filter, Some(self.amp)]
            .into_iter()
            .flatten()
    }
}

#[derive(Clone, Debug)]
pub struct Voice {
    pub state: VoiceState,
    pub source: VoiceSource,
    /// Clip note that produced this voice; `None` for live input
    pub note: Option<NoteId>,
    pub starts_at: f64,
    pub release_start: f64,
    pub ends_at: f64,
    /// Normal release length for explicit stops, in seconds
    pub release: f64,
    pub nodes: Option<VoiceNodes>,
}

impl Voice {
    pub fn pending(source: VoiceSource, note: Option<NoteId>, starts_at: f64, release: f64) -> Self {
        Self {
            state: VoiceState::Pending,
            source,
            note,
            starts_at,
            release_start: f64::INFINITY,
            ends_at: f64::INFINITY,
            release,
            nodes: None,
        }
    }

    pub fn pitch(&self) -> Option<u8> {
        match self.source {
            VoiceSource::Note { pitch, .. } => Some(pitch),
            VoiceSource::Sample { .. } => None,
        }
    }

    /// Not yet audible at `now`: still queued, or built but starting later.
    pub fn is_pending(&self, now: f64) -> bool {
        self.state == VoiceState::Pending || self.starts_at >= now
    }

    /// Already ramping toward silence at `now`.
    pub fn is_releasing(&self, now: f64) -> bool {
        self.state == VoiceState::Releasing || self.release_start <= now
    }

    /// Sustains until explicitly stopped.
    pub fn is_held(&self) -> bool {
        self.state != VoiceState::Pending && self.ends_at.is_infinite()
    }
}
