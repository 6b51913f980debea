//! Clips and their placements.

use std::collections::HashMap;
use std::sync::Arc;

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

use crate::time::seconds_to_beats;
use crate::{ClipId, InstanceId, MidiNote, NoteId};

/// A MIDI clip: a named container of notes sorted by start.
///
/// Notes with equal starts keep insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MidiClip {
    id: ClipId,
    pub name: ArrayString<32>,
    notes: Vec<MidiNote>,
    length: f64,
}

impl MidiClip {
    /// Create an empty clip `length` beats long.
    pub fn new(name: &str, length: f64) -> Self {
        Self {
            id: ClipId::new(),
            name: truncated_name(name),
            notes: Vec::new(),
            length: sanitize_length(length),
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    pub fn notes(&self) -> &[MidiNote] {
        &self.notes
    }

    /// Nominal length in beats.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn set_length(&mut self, length: f64) {
        self.length = sanitize_length(length);
    }

    /// Latest note end, which may exceed the nominal length.
    pub fn content_end(&self) -> f64 {
        self.notes.iter().map(MidiNote::end).fold(0.0, f64::max)
    }

    pub fn note(&self, id: NoteId) -> Option<&MidiNote> {
        self.notes.iter().find(|n| n.id() == id)
    }

    /// Insert a note in start order and return its id.
    pub fn add_note(&mut self, mut note: MidiNote) -> NoteId {
        note.sanitize();
        let id = note.id();
        self.insert_sorted(note);
        id
    }

    pub fn remove_note(&mut self, id: NoteId) -> Option<MidiNote> {
        let idx = self.notes.iter().position(|n| n.id() == id)?;
        Some(self.notes.remove(idx))
    }

    /// Edit a note in place. The note is re-sorted if its start moved.
    /// Returns false when no note has that id.
    pub fn update_note(&mut self, id: NoteId, edit: impl FnOnce(&mut MidiNote)) -> bool {
        let Some(idx) = self.notes.iter().position(|n| n.id() == id) else {
            return false;
        };
        let mut note = self.notes.remove(idx);
        edit(&mut note);
        note.sanitize();
        self.insert_sorted(note);
        true
    }

    /// Notes whose start falls in `[from, until)`.
    pub fn notes_in(&self, from: f64, until: f64) -> &[MidiNote] {
        let lo = self.notes.partition_point(|n| n.start < from);
        let hi = self.notes.partition_point(|n| n.start < until);
        &self.notes[lo..hi.max(lo)]
    }

    /// Deep copy under a new clip id, with fresh note ids.
    pub fn duplicate(&self) -> Self {
        Self {
            id: ClipId::new(),
            name: self.name,
            notes: self.notes.iter().map(MidiNote::with_fresh_id).collect(),
            length: self.length,
        }
    }

    /// Restore ordering and ranges after deserializing untrusted data.
    pub fn normalize(&mut self) {
        for note in &mut self.notes {
            note.sanitize();
        }
        self.notes.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.length = sanitize_length(self.length);
    }

    fn insert_sorted(&mut self, note: MidiNote) {
        let idx = self.notes.partition_point(|n| n.start <= note.start);
        self.notes.insert(idx, note);
    }
}

/// Decoded stereo sample data at its native rate.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleData {
    sample_rate: u32,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl SampleData {
    /// Build from interleaved samples. Mono input is duplicated to both
    /// sides; channels beyond the second are ignored.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1) as usize;
        let frames = samples.len() / channels;
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in samples.chunks_exact(channels) {
            left.push(frame[0]);
            right.push(if channels > 1 { frame[1] } else { frame[0] });
        }
        Self {
            sample_rate: sample_rate.max(1),
            left,
            right,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    /// Stereo frame at `index`, silence past the end.
    pub fn frame(&self, index: usize) -> (f32, f32) {
        match (self.left.get(index), self.right.get(index)) {
            (Some(&l), Some(&r)) => (l, r),
            _ => (0.0, 0.0),
        }
    }
}

/// An audio clip: a named reference to shared sample data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    id: ClipId,
    pub name: ArrayString<32>,
    pub data: Arc<SampleData>,
}

impl AudioClip {
    pub fn new(name: &str, data: Arc<SampleData>) -> Self {
        Self {
            id: ClipId::new(),
            name: truncated_name(name),
            data,
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    /// Clip length in beats at `bpm`.
    pub fn length_beats(&self, bpm: f64) -> f64 {
        seconds_to_beats(self.data.duration_secs(), bpm)
    }

    /// Copy under a new id, sharing the sample data.
    pub fn duplicate(&self) -> Self {
        Self {
            id: ClipId::new(),
            name: self.name,
            data: Arc::clone(&self.data),
        }
    }
}

/// Any clip held in the project pool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Clip {
    Midi(MidiClip),
    Audio(AudioClip),
}

impl Clip {
    pub fn id(&self) -> ClipId {
        match self {
            Clip::Midi(c) => c.id(),
            Clip::Audio(c) => c.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Clip::Midi(c) => c.name.as_str(),
            Clip::Audio(c) => c.name.as_str(),
        }
    }

    /// Length in beats. Audio clip length depends on tempo.
    pub fn length_beats(&self, bpm: f64) -> f64 {
        match self {
            Clip::Midi(c) => c.length(),
            Clip::Audio(c) => c.length_beats(bpm),
        }
    }

    /// Beats the clip actually plays for. MIDI notes may run past the
    /// nominal length.
    pub fn extent_beats(&self, bpm: f64) -> f64 {
        match self {
            Clip::Midi(c) => c.length().max(c.content_end()),
            Clip::Audio(c) => c.length_beats(bpm),
        }
    }

    pub fn as_midi(&self) -> Option<&MidiClip> {
        match self {
            Clip::Midi(c) => Some(c),
            Clip::Audio(_) => None,
        }
    }

    pub fn as_midi_mut(&mut self) -> Option<&mut MidiClip> {
        match self {
            Clip::Midi(c) => Some(c),
            Clip::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioClip> {
        match self {
            Clip::Audio(c) => Some(c),
            Clip::Midi(_) => None,
        }
    }

    pub fn duplicate(&self) -> Self {
        match self {
            Clip::Midi(c) => Clip::Midi(c.duplicate()),
            Clip::Audio(c) => Clip::Audio(c.duplicate()),
        }
    }
}

impl From<MidiClip> for Clip {
    fn from(clip: MidiClip) -> Self {
        Clip::Midi(clip)
    }
}

impl From<AudioClip> for Clip {
    fn from(clip: AudioClip) -> Self {
        Clip::Audio(clip)
    }
}

/// One placement of a pooled clip on a track timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipInstance {
    id: InstanceId,
    pub clip: ClipId,
    /// Absolute start on the timeline, in beats
    pub start_beat: f64,
}

impl ClipInstance {
    pub fn new(clip: ClipId, start_beat: f64) -> Self {
        Self {
            id: InstanceId::new(),
            clip,
            start_beat: sanitize_length(start_beat),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Absolute end in beats of everything the referenced clip plays.
    pub fn end_beat(&self, clip: &Clip, bpm: f64) -> f64 {
        self.start_beat + clip.extent_beats(bpm)
    }
}

/// Project-wide clip storage keyed by id.
#[derive(Clone, Debug, Default)]
pub struct ClipPool {
    clips: HashMap<ClipId, Clip>,
}

impl ClipPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a clip, returning its id. Replaces any clip with the same id.
    pub fn insert(&mut self, clip: impl Into<Clip>) -> ClipId {
        let clip = clip.into();
        let id = clip.id();
        self.clips.insert(id, clip);
        id
    }

    pub fn get(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(&id)
    }

    pub fn midi(&self, id: ClipId) -> Option<&MidiClip> {
        self.get(id).and_then(Clip::as_midi)
    }

    pub fn midi_mut(&mut self, id: ClipId) -> Option<&mut MidiClip> {
        self.get_mut(id).and_then(Clip::as_midi_mut)
    }

    pub fn remove(&mut self, id: ClipId) -> Option<Clip> {
        self.clips.remove(&id)
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.clips.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

fn truncated_name(name: &str) -> ArrayString<32> {
    let mut out = ArrayString::new();
    for ch in name.chars() {
        if out.try_push(ch).is_err() {
            break;
        }
    }
    out
}

fn sanitize_length(beats: f64) -> f64 {
    if beats.is_finite() {
        beats.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_with(starts: &[f64]) -> MidiClip {
        let mut clip = MidiClip::new("test", 4.0);
        for (i, &s) in starts.iter().enumerate() {
            clip.add_note(MidiNote::new(60 + i as u8, 100, s, 0.5));
        }
        clip
    }

    #[test]
    fn notes_stay_sorted_stably() {
        let clip = clip_with(&[2.0, 0.0, 1.0, 1.0]);
        let starts: Vec<f64> = clip.notes().iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0.0, 1.0, 1.0, 2.0]);
        // Equal starts keep insertion order: pitch 62 was added before 63.
        assert_eq!(clip.notes()[1].pitch, 62);
        assert_eq!(clip.notes()[2].pitch, 63);
    }

    #[test]
    fn update_resorts_moved_note() {
        let mut clip = clip_with(&[0.0, 1.0, 2.0]);
        let id = clip.notes()[0].id();
        assert!(clip.update_note(id, |n| n.start = 3.0));
        assert_eq!(clip.notes().last().map(MidiNote::id), Some(id));
        assert!(!clip.update_note(NoteId::new(), |_| {}));
    }

    #[test]
    fn remove_unknown_note_is_none() {
        let mut clip = clip_with(&[0.0]);
        assert!(clip.remove_note(NoteId::new()).is_none());
        let id = clip.notes()[0].id();
        assert!(clip.remove_note(id).is_some());
        assert!(clip.notes().is_empty());
    }

    #[test]
    fn notes_in_is_half_open() {
        let clip = clip_with(&[0.0, 1.0, 2.0, 3.0]);
        let hits: Vec<f64> = clip.notes_in(1.0, 3.0).iter().map(|n| n.start).collect();
        assert_eq!(hits, vec![1.0, 2.0]);
        assert!(clip.notes_in(3.5, 1.0).is_empty());
    }

    #[test]
    fn duplicate_gets_fresh_ids() {
        let clip = clip_with(&[0.0, 1.0]);
        let copy = clip.duplicate();
        assert_ne!(copy.id(), clip.id());
        for (a, b) in clip.notes().iter().zip(copy.notes()) {
            assert_ne!(a.id(), b.id());
            assert_eq!(a.start, b.start);
        }
    }

    #[test]
    fn content_may_exceed_length() {
        let mut clip = MidiClip::new("long", 1.0);
        clip.add_note(MidiNote::new(60, 100, 0.5, 2.0));
        assert_eq!(clip.length(), 1.0);
        assert_eq!(clip.content_end(), 2.5);

        let clip = Clip::from(clip);
        let instance = ClipInstance::new(clip.id(), 4.0);
        assert_eq!(clip.length_beats(120.0), 1.0);
        assert_eq!(instance.end_beat(&clip, 120.0), 6.5);
    }

    #[test]
    fn normalize_sorts_deserialized_notes() {
        let mut value = serde_json::to_value(clip_with(&[0.0, 2.0, 3.0])).unwrap();
        value["notes"].as_array_mut().unwrap().reverse();
        let mut clip: MidiClip = serde_json::from_value(value).unwrap();
        assert_eq!(clip.notes()[0].start, 3.0);

        clip.normalize();
        let starts: Vec<f64> = clip.notes().iter().map(|n| n.start).collect();
        assert_eq!(starts, vec![0.0, 2.0, 3.0]);
        assert_eq!(clip.notes_in(0.0, 4.0).len(), 3);
    }

    #[test]
    fn audio_clip_length_tracks_tempo() {
        let data = SampleData::from_interleaved(&vec![0.0; 88_200], 2, 44_100);
        let clip = AudioClip::new("loop", Arc::new(data));
        assert_eq!(clip.length_beats(120.0), 2.0);
        assert_eq!(clip.length_beats(60.0), 1.0);
    }

    #[test]
    fn mono_samples_fill_both_sides() {
        let data = SampleData::from_interleaved(&[0.5, -0.5], 1, 8_000);
        assert_eq!(data.frames(), 2);
        assert_eq!(data.frame(1), (-0.5, -0.5));
        assert_eq!(data.frame(5), (0.0, 0.0));
    }

    #[test]
    fn long_names_are_truncated() {
        let clip = MidiClip::new(&"x".repeat(64), 1.0);
        assert_eq!(clip.name.len(), 32);
    }
}
