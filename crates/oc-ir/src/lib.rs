//! Core timeline types for the octavo playback engine.
//!
//! This crate defines the data the rest of the workspace operates on:
//! notes, clips and their placements, track kinds and mix state, the
//! beat/second conversions, and the typed events the controller publishes.
//! It holds no audio state.

mod clip;
mod event;
mod ids;
mod note;
mod project_data;
mod time;
mod track;

pub use clip::{AudioClip, Clip, ClipInstance, ClipPool, MidiClip, SampleData};
pub use event::{EventKind, LoopRegion, ProjectEvent, TransportState, MIN_LOOP_LENGTH};
pub use ids::{ClipId, InstanceId, NoteId, TrackId};
pub use note::MidiNote;
pub use project_data::{ProjectData, TrackData};
pub use time::{
    beats_per_second, beats_to_seconds, clamp_bpm, seconds_to_beats, TimeSignature, DEFAULT_BPM,
    MAX_BPM, MIN_BPM,
};
pub use track::{
    Adsr, AudioTrack, BusTrack, MidiTrack, MixState, SynthPatch, TrackBehavior, TrackKind,
    Waveform,
};
