//! Voice scheduling: turns clip placements into timed voice events.
//!
//! Scheduling registers a pending voice on the track and queues its start.
//! Each tick, [`VoiceScheduler::process`] fires every queued start that
//! falls inside the lookahead window, building the voice's nodes against the
//! audio clock at the exact target time, and reaps voices whose release has
//! completed.

use oc_ir::{Adsr, Clip, ClipId, ClipInstance, ClipPool, NoteId, TrackId};
use tracing::debug;

use crate::config::{MetronomeConfig, VoiceConfig};
use crate::envelope::{schedule_contour, schedule_release, Contour};
use crate::event_queue::{Action, EventQueue, Scheduled};
use crate::frequency::midi_to_hz;
use crate::manager::AudioGraphManager;
use crate::metronome::{Metronome, CLICK_LENGTH};
use crate::node::{FilterMode, ParamKind};
use crate::param::AudioParam;
use crate::track::Track;
use crate::voice::{Voice, VoiceId, VoiceNodes, VoiceSource, VoiceState};

/// Slack when matching a reap against a voice's end time.
const REAP_EPSILON: f64 = 1e-9;

/// Where a clip instance lands on the audio clock, and which part of it to
/// schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    /// Audio-clock time of the instance's beat 0
    pub t0: f64,
    pub bpm: f64,
    /// Clip-relative beat range `[from, until)`
    pub from: f64,
    pub until: f64,
    /// Start audio clips already under way at `from`
    pub catch_up: bool,
}

impl Window {
    fn beats_per_second(&self) -> f64 {
        oc_ir::beats_per_second(self.bpm)
    }

    fn time_of(&self, beat: f64) -> f64 {
        self.t0 + beat / self.beats_per_second()
    }
}

/// How voices end when many are released at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Each voice's own release
    Natural,
    /// The short configured force release
    Forced,
}

pub struct VoiceScheduler {
    starts: EventQueue,
    cleanup: EventQueue,
    config: VoiceConfig,
    metronome: Metronome,
    lookahead: f64,
}

impl VoiceScheduler {
    pub fn new(config: VoiceConfig, metronome: MetronomeConfig, lookahead: f64) -> Self {
        Self {
            starts: EventQueue::new(),
            cleanup: EventQueue::new(),
            config,
            metronome: Metronome::new(metronome),
            lookahead: lookahead.max(0.0),
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn metronome(&self) -> &Metronome {
        &self.metronome
    }

    pub fn metronome_mut(&mut self) -> &mut Metronome {
        &mut self.metronome
    }

    /// Starts queued but not yet fired.
    pub fn pending_starts(&self) -> usize {
        self.starts.len()
    }

    /// Next queued start time, if any.
    pub fn next_start(&self) -> Option<f64> {
        self.starts.peek().map(|e| e.time)
    }

    // --- Scheduling ---

    /// Schedule the part of `instance` inside `window`. Returns how many
    /// voices were registered.
    pub fn schedule_instance(
        &mut self,
        track: &mut Track,
        instance: &ClipInstance,
        clip: &Clip,
        window: Window,
    ) -> usize {
        if instance.clip != clip.id() || !track.kind.accepts(clip) || window.until <= window.from {
            return 0;
        }
        let bps = window.beats_per_second();
        match clip {
            Clip::Midi(midi) => {
                let mut count = 0;
                for note in midi.notes_in(window.from, window.until) {
                    let start = window.time_of(note.start);
                    let duration = note.duration / bps;
                    let voice = self.schedule_note(
                        track,
                        note.pitch,
                        note.velocity,
                        start,
                        Some(duration),
                        Some(note.id()),
                    );
                    count += voice.is_some() as usize;
                }
                count
            }
            Clip::Audio(audio) => {
                let length = audio.length_beats(window.bpm);
                let begin = if window.from <= 0.0 && window.until > 0.0 {
                    Some(0.0)
                } else if window.catch_up && window.from > 0.0 && window.from < length {
                    Some(window.from)
                } else {
                    None
                };
                match begin {
                    Some(beat) => self
                        .schedule_sample(track, audio.id(), window.time_of(beat), beat / bps)
                        .map_or(0, |_| 1),
                    None => 0,
                }
            }
        }
    }

    /// Register a synth voice and queue its start. Muted and non-MIDI
    /// tracks get no voice.
    pub fn schedule_note(
        &mut self,
        track: &mut Track,
        pitch: u8,
        velocity: u8,
        start: f64,
        duration: Option<f64>,
        note: Option<NoteId>,
    ) -> Option<VoiceId> {
        let release = track.kind.patch()?.envelope.sanitized().release;
        if track.mix().muted {
            debug!(track = %track.id(), pitch, "muted, note suppressed");
            return None;
        }
        let pitch = pitch.min(127);
        let velocity = velocity.min(127);
        let voice = track.voices.insert(Voice::pending(
            VoiceSource::Note { pitch, velocity },
            note,
            start,
            release,
        ));
        self.starts.push(
            start,
            Action::NoteOn {
                track: track.id(),
                voice,
                pitch,
                velocity,
                duration: duration.map(|d| d.max(0.0)),
            },
        );
        Some(voice)
    }

    /// Register a sample voice for an audio clip starting `offset` seconds in.
    pub fn schedule_sample(
        &mut self,
        track: &mut Track,
        clip: ClipId,
        start: f64,
        offset: f64,
    ) -> Option<VoiceId> {
        let oc_ir::TrackKind::Audio(kind) = &track.kind else {
            return None;
        };
        let declick = kind.declick.max(0.0);
        if track.mix().muted {
            debug!(track = %track.id(), "muted, sample suppressed");
            return None;
        }
        let voice = track.voices.insert(Voice::pending(
            VoiceSource::Sample { clip },
            None,
            start,
            declick,
        ));
        self.starts.push(
            start,
            Action::SampleStart {
                track: track.id(),
                voice,
                clip,
                offset: offset.max(0.0),
            },
        );
        Some(voice)
    }

    pub fn schedule_click(&mut self, time: f64, accent: bool) {
        self.starts.push(time, Action::Click { accent });
    }

    /// Live input: a sustained note starting now.
    pub fn note_on(&mut self, track: &mut Track, pitch: u8, velocity: u8, now: f64) -> Option<VoiceId> {
        self.schedule_note(track, pitch, velocity, now, None, None)
    }

    // --- Tick ---

    /// Fire starts inside the lookahead window and reap finished voices.
    /// Returns how many starts fired.
    pub fn process(
        &mut self,
        audio: &AudioGraphManager,
        tracks: &mut [Track],
        clips: &ClipPool,
        now: f64,
    ) -> usize {
        let due = self.starts.pop_before(now + self.lookahead);
        let fired = due.len();
        for event in due {
            self.fire(audio, tracks, clips, event, now);
        }
        for event in self.cleanup.pop_until(now) {
            self.clean(audio, tracks, event);
        }
        fired
    }

    fn fire(
        &mut self,
        audio: &AudioGraphManager,
        tracks: &mut [Track],
        clips: &ClipPool,
        event: Scheduled,
        now: f64,
    ) {
        let start = event.time.max(now);
        match event.action {
            Action::NoteOn {
                track,
                voice,
                pitch,
                velocity,
                duration,
            } => {
                let Some(track) = find(tracks, track) else {
                    return;
                };
                if !take_unmuted(track, voice) {
                    return;
                }
                let Some(patch) = track.kind.patch().copied() else {
                    track.voices.remove(voice);
                    return;
                };
                let peak = velocity as f32 / 127.0;
                let nodes = self.build_synth(audio, track, &patch, pitch);
                let contour = shape(audio, nodes, &patch.envelope, peak, start, duration);
                self.activate(audio, track, voice, start, contour, nodes);
                debug!(track = %track.id(), pitch, start, "note on");
            }
            Action::SampleStart {
                track,
                voice,
                clip,
                offset,
            } => {
                let Some(track) = find(tracks, track) else {
                    return;
                };
                if !take_unmuted(track, voice) {
                    return;
                }
                let Some(data) = clips.get(clip).and_then(Clip::as_audio).map(|c| c.data.clone()) else {
                    track.voices.remove(voice);
                    return;
                };
                let declick = track.voice(voice).map_or(0.0, |v| v.release);
                let remaining = (data.duration_secs() - offset).max(0.0);
                let nodes = track.input().and_then(|input| {
                    let source = audio.create_buffer_source(data)?;
                    let amp = audio.create_gain(0.0)?;
                    audio.connect(source, amp).ok()?;
                    audio.connect(amp, input).ok()?;
                    audio.with_graph(|g| g.node_mut(source).map(|n| n.start_at(start, offset)));
                    Some(VoiceNodes {
                        source,
                        filter: None,
                        amp,
                    })
                });
                let fade = Adsr {
                    attack: declick,
                    decay: 0.0,
                    sustain: 1.0,
                    release: declick,
                };
                let contour = shape(audio, nodes, &fade, 1.0, start, Some(remaining));
                self.activate(audio, track, voice, start, contour, nodes);
                debug!(track = %track.id(), %clip, start, offset, "sample start");
            }
            Action::Click { accent } => {
                if let Some(nodes) = self.metronome.build_click(audio, start, accent) {
                    self.cleanup.push(start + CLICK_LENGTH, Action::Free { nodes });
                }
            }
            Action::Reap { .. } | Action::Free { .. } => self.cleanup.push(event.time, event.action),
        }
    }

    fn build_synth(
        &self,
        audio: &AudioGraphManager,
        track: &Track,
        patch: &oc_ir::SynthPatch,
        pitch: u8,
    ) -> Option<VoiceNodes> {
        let input = track.input()?;
        let source = audio.create_oscillator(patch.waveform, midi_to_hz(pitch))?;
        let filter = audio.create_filter(FilterMode::LowPass, patch.cutoff_hz, patch.resonance)?;
        let amp = audio.create_gain(0.0)?;
        let wired = audio
            .connect(source, filter)
            .and_then(|_| audio.connect(filter, amp))
            .and_then(|_| audio.connect(amp, input));
        if wired.is_err() {
            for node in [source, filter, amp] {
                audio.remove_node(node);
            }
            return None;
        }
        Some(VoiceNodes {
            source,
            filter: Some(filter),
            amp,
        })
    }

    /// Mark a fired voice active, start its source and queue its reap.
    fn activate(
        &mut self,
        audio: &AudioGraphManager,
        track: &mut Track,
        id: VoiceId,
        start: f64,
        contour: Contour,
        nodes: Option<VoiceNodes>,
    ) {
        let tail = self.config.stop_tail;
        if let Some(nodes) = nodes {
            audio.with_graph(|g| {
                if let Some(node) = g.node_mut(nodes.source) {
                    if !matches!(node, crate::node::Node::BufferSource(_)) {
                        node.start_at(start, 0.0);
                    }
                    if contour.ends_at.is_finite() {
                        node.stop_at(contour.ends_at + tail);
                    }
                }
            });
        }
        let track_id = track.id();
        if let Some(voice) = track.voices.get_mut(id) {
            voice.state = VoiceState::Active;
            voice.starts_at = start;
            voice.release_start = contour.release_start;
            voice.ends_at = contour.ends_at;
            voice.nodes = nodes;
        }
        if contour.ends_at.is_finite() {
            self.cleanup.push(
                contour.ends_at,
                Action::Reap {
                    track: track_id,
                    voice: id,
                },
            );
        }
    }

    fn clean(&mut self, audio: &AudioGraphManager, tracks: &mut [Track], event: Scheduled) {
        match event.action {
            Action::Reap { track, voice } => {
                let Some(track) = find(tracks, track) else {
                    return;
                };
                let due = track
                    .voice(voice)
                    .is_some_and(|v| v.ends_at <= event.time + REAP_EPSILON);
                if due {
                    remove_voice(audio, track, voice);
                    debug!(track = %track.id(), "voice reaped");
                }
            }
            Action::Free { nodes } => {
                for node in nodes {
                    audio.remove_node(node);
                }
            }
            _ => {}
        }
    }

    // --- Stopping ---

    /// Stop one voice. A pending voice is cancelled and removed at once; a
    /// sounding voice releases from its current amplitude and is removed when
    /// the release completes. Stopping a releasing voice does nothing.
    /// Returns whether anything changed.
    pub fn stop_note(
        &mut self,
        audio: &AudioGraphManager,
        track: &mut Track,
        id: VoiceId,
        now: f64,
    ) -> bool {
        let Some(voice) = track.voice(id) else {
            return false;
        };
        if voice.is_pending(now) {
            self.starts.retain(|e| e.action.voice() != Some((track.id(), id)));
            remove_voice(audio, track, id);
            return true;
        }
        if voice.is_releasing(now) {
            return false;
        }
        let release = voice.release;
        self.release_voice(audio, track, id, now, release);
        true
    }

    /// Stop every live-input voice of `pitch` on the track.
    pub fn stop_note_by_midi(
        &mut self,
        audio: &AudioGraphManager,
        track: &mut Track,
        pitch: u8,
        now: f64,
    ) -> usize {
        let ids: Vec<VoiceId> = track
            .voices()
            .filter(|(_, v)| v.note.is_none() && v.pitch() == Some(pitch))
            .map(|(id, _)| id)
            .collect();
        ids.into_iter()
            .filter(|&id| self.stop_note(audio, track, id, now))
            .count()
    }

    fn release_voice(
        &mut self,
        audio: &AudioGraphManager,
        track: &mut Track,
        id: VoiceId,
        now: f64,
        release: f64,
    ) {
        let track_id = track.id();
        let tail = self.config.stop_tail;
        let Some(voice) = track.voices.get_mut(id) else {
            return;
        };
        let ends_at = match voice.nodes {
            Some(nodes) => {
                let end = audio
                    .param(nodes.amp, ParamKind::Gain, |p| schedule_release(p, now, release))
                    .unwrap_or(now + release);
                audio.with_graph(|g| g.node_mut(nodes.source).map(|n| n.stop_at(end + tail)));
                end
            }
            None => now + release.max(1e-4),
        };
        voice.state = VoiceState::Releasing;
        voice.release_start = now;
        voice.ends_at = ends_at;
        self.cleanup.push(
            ends_at,
            Action::Reap {
                track: track_id,
                voice: id,
            },
        );
    }

    /// Cancel starts that have not sounded yet, on one track or all of them.
    /// Their voices are dropped. Returns how many voices were removed.
    pub fn cancel_pending(
        &mut self,
        audio: &AudioGraphManager,
        tracks: &mut [Track],
        now: f64,
        only: Option<TrackId>,
    ) -> usize {
        let in_scope = |track: TrackId| only.map_or(true, |t| t == track);
        self.starts.retain(|e| match e.action.voice() {
            Some((track, _)) => !in_scope(track),
            None => only.is_some(),
        });
        let mut removed = 0;
        for track in tracks.iter_mut().filter(|t| in_scope(t.id())) {
            let ids: Vec<VoiceId> = track
                .voices()
                .filter(|(_, v)| v.is_pending(now))
                .map(|(id, _)| id)
                .collect();
            for id in ids {
                remove_voice(audio, track, id);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "pending voices cancelled");
        }
        removed
    }

    /// Release every sounding voice. Pending voices are dropped first.
    pub fn release_all(
        &mut self,
        audio: &AudioGraphManager,
        tracks: &mut [Track],
        now: f64,
        mode: ReleaseMode,
    ) {
        self.cancel_pending(audio, tracks, now, None);
        let force = self.config.force_release;
        for track in tracks.iter_mut() {
            let ids: Vec<(VoiceId, f64, bool, f64)> = track
                .voices()
                .map(|(id, v)| (id, v.release, v.is_releasing(now), v.ends_at))
                .collect();
            for (id, release, releasing, ends_at) in ids {
                match mode {
                    ReleaseMode::Natural if !releasing => {
                        self.release_voice(audio, track, id, now, release)
                    }
                    ReleaseMode::Forced if ends_at > now + force => {
                        self.release_voice(audio, track, id, now, force)
                    }
                    _ => {}
                }
            }
        }
    }

    /// Drop queued work that refers to `track`.
    pub fn forget_track(&mut self, track: TrackId) {
        self.starts.retain(|e| e.action.voice().map_or(true, |(t, _)| t != track));
        self.cleanup.retain(|e| e.action.voice().map_or(true, |(t, _)| t != track));
    }
}

fn find(tracks: &mut [Track], id: TrackId) -> Option<&mut Track> {
    tracks.iter_mut().find(|t| t.id() == id)
}

/// Whether a pending voice may fire. Voices on muted tracks are dropped.
fn take_unmuted(track: &mut Track, voice: VoiceId) -> bool {
    if track.voice(voice).is_none() {
        return false;
    }
    if track.mix().muted {
        track.voices.remove(voice);
        debug!(track = %track.id(), "muted at fire time, voice dropped");
        return false;
    }
    true
}

/// Write the envelope on the voice's amp, or compute its timing alone
/// when the voice has no nodes.
fn shape(
    audio: &AudioGraphManager,
    nodes: Option<VoiceNodes>,
    env: &Adsr,
    peak: f32,
    start: f64,
    duration: Option<f64>,
) -> Contour {
    let written = nodes.and_then(|n| {
        audio.param(n.amp, ParamKind::Gain, |p| schedule_contour(p, env, peak, start, duration))
    });
    written.unwrap_or_else(|| {
        let mut scratch = AudioParam::new(0.0, 0.0, 1.0);
        schedule_contour(&mut scratch, env, peak, start, duration)
    })
}

fn remove_voice(audio: &AudioGraphManager, track: &mut Track, id: VoiceId) {
    if let Some(voice) = track.voices.remove(id) {
        if let Some(nodes) = voice.nodes {
            for node in nodes.iter() {
                audio.remove_node(node);
            }
        }
    }
}
