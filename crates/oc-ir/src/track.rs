//! Track kinds, synth patches and mix state.

use serde::{Deserialize, Serialize};

use crate::{Clip, TrackId};

/// Oscillator shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

/// Envelope times in seconds; `sustain` is a fraction of the peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    /// Clamp times to be non-negative and sustain into `[0, 1]`.
    pub fn sanitized(self) -> Self {
        let time = |t: f64| if t.is_finite() { t.max(0.0) } else { 0.0 };
        Self {
            attack: time(self.attack),
            decay: time(self.decay),
            sustain: if self.sustain.is_finite() { self.sustain.clamp(0.0, 1.0) } else { 1.0 },
            release: time(self.release),
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// Sound of a MIDI track's built-in synth voice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthPatch {
    pub waveform: Waveform,
    pub envelope: Adsr,
    /// Low-pass cutoff in Hz
    pub cutoff_hz: f32,
    /// Filter resonance (0..1)
    pub resonance: f32,
}

impl Default for SynthPatch {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sawtooth,
            envelope: Adsr::default(),
            cutoff_hz: 2400.0,
            resonance: 0.2,
        }
    }
}

/// Per-track mix controls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixState {
    volume: f32,
    pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub armed: bool,
}

impl MixState {
    /// Linear gain in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Stereo position in `[-1, 1]`.
    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.volume
    }

    pub fn set_pan(&mut self, pan: f32) -> f32 {
        self.pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
        self.pan
    }

    /// Audible when soloed or when no track is soloed, and never when muted.
    pub fn is_audible(&self, any_solo: bool) -> bool {
        (self.solo || !any_solo) && !self.muted
    }
}

impl Default for MixState {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            muted: false,
            solo: false,
            armed: false,
        }
    }
}

/// A track playing MIDI clips through a synth voice.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct MidiTrack {
    pub patch: SynthPatch,
}

/// A track playing audio clips.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTrack {
    /// Fade applied at each sample start and stop, in seconds
    pub declick: f64,
}

impl Default for AudioTrack {
    fn default() -> Self {
        Self { declick: 0.005 }
    }
}

/// A track that sums other tracks.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BusTrack {
    pub children: Vec<TrackId>,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::MidiTrack {}
    impl Sealed for super::AudioTrack {}
    impl Sealed for super::BusTrack {}
}

/// Behavior shared by the closed set of track kinds.
pub trait TrackBehavior: sealed::Sealed {
    fn label(&self) -> &'static str;

    /// Whether a clip can be placed on this track.
    fn accepts(&self, clip: &Clip) -> bool;

    /// Whether other tracks may route into this one.
    fn is_bus(&self) -> bool {
        false
    }
}

impl TrackBehavior for MidiTrack {
    fn label(&self) -> &'static str {
        "midi"
    }

    fn accepts(&self, clip: &Clip) -> bool {
        matches!(clip, Clip::Midi(_))
    }
}

impl TrackBehavior for AudioTrack {
    fn label(&self) -> &'static str {
        "audio"
    }

    fn accepts(&self, clip: &Clip) -> bool {
        matches!(clip, Clip::Audio(_))
    }
}

impl TrackBehavior for BusTrack {
    fn label(&self) -> &'static str {
        "bus"
    }

    fn accepts(&self, _clip: &Clip) -> bool {
        false
    }

    fn is_bus(&self) -> bool {
        true
    }
}

/// What a track plays.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TrackKind {
    Midi(MidiTrack),
    Audio(AudioTrack),
    Bus(BusTrack),
}

impl TrackKind {
    pub fn midi() -> Self {
        TrackKind::Midi(MidiTrack::default())
    }

    pub fn audio() -> Self {
        TrackKind::Audio(AudioTrack::default())
    }

    pub fn bus() -> Self {
        TrackKind::Bus(BusTrack::default())
    }

    pub fn behavior(&self) -> &dyn TrackBehavior {
        match self {
            TrackKind::Midi(t) => t,
            TrackKind::Audio(t) => t,
            TrackKind::Bus(t) => t,
        }
    }

    pub fn accepts(&self, clip: &Clip) -> bool {
        self.behavior().accepts(clip)
    }

    pub fn patch(&self) -> Option<&SynthPatch> {
        match self {
            TrackKind::Midi(t) => Some(&t.patch),
            _ => None,
        }
    }
}
