//! Serializable snapshot of a project's musical content.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

use crate::{Clip, ClipInstance, LoopRegion, MixState, TimeSignature, TrackId, TrackKind, DEFAULT_BPM};

/// One track's persisted state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub id: TrackId,
    pub name: ArrayString<32>,
    pub kind: TrackKind,
    pub mix: MixState,
    /// Bus this track feeds, or the master chain when `None`
    pub output: Option<TrackId>,
    pub instances: Vec<ClipInstance>,
}

/// Everything needed to rebuild a project, without runtime audio state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectData {
    pub name: String,
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub loop_region: LoopRegion,
    pub metronome: bool,
    pub master_volume: f32,
    pub tracks: Vec<TrackData>,
    pub clips: Vec<Clip>,
}

impl Default for ProjectData {
    fn default() -> Self {
        Self {
            name: String::from("Untitled"),
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            loop_region: LoopRegion::default(),
            metronome: false,
            master_volume: 0.8,
            tracks: Vec::new(),
            clips: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MidiClip, MidiNote};

    #[test]
    fn json_round_trip_keeps_clip_content() {
        let mut clip = MidiClip::new("lead", 4.0);
        clip.add_note(MidiNote::new(64, 90, 1.0, 0.5));
        let clip_id = clip.id();
        let data = ProjectData {
            tracks: vec![TrackData {
                id: TrackId::new(),
                name: ArrayString::from("Lead").unwrap_or_default(),
                kind: TrackKind::midi(),
                mix: MixState::default(),
                output: None,
                instances: vec![ClipInstance::new(clip_id, 8.0)],
            }],
            clips: vec![clip.into()],
            ..ProjectData::default()
        };
        let json = serde_json::to_string(&data).unwrap();
        let back: ProjectData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
        assert_eq!(back.tracks[0].instances[0].clip, clip_id);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let back: ProjectData = serde_json::from_str(r#"{"bpm": 90.0}"#).unwrap();
        assert_eq!(back.bpm, 90.0);
        assert_eq!(back.time_signature, TimeSignature::default());
        assert!(back.tracks.is_empty());
    }
}
