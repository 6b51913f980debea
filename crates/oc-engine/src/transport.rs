//! Transport: play state, musical position and tempo.
//!
//! Position is derived from an anchor `(beats, time)` on the audio clock and
//! the tempo. Every tempo, seek or loop change rebases the anchor at the
//! moment of the change so the position never jumps.

use oc_ir::{
    beats_per_second, clamp_bpm, ClipPool, LoopRegion, ProjectEvent, TimeSignature, TrackId,
    TransportState, DEFAULT_BPM,
};
use tracing::{debug, info};

use crate::manager::AudioGraphManager;
use crate::scheduler::{ReleaseMode, VoiceScheduler, Window};
use crate::track::Track;

/// Everything the transport drives while rolling.
pub struct Session<'a> {
    pub audio: &'a AudioGraphManager,
    pub scheduler: &'a mut VoiceScheduler,
    pub tracks: &'a mut [Track],
    pub clips: &'a ClipPool,
    pub time_signature: TimeSignature,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Anchor {
    beats: f64,
    time: f64,
}

/// Next metronome beat and its time on the audio clock.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ClickCursor {
    beat: u64,
    time: f64,
}

/// Outcome of one scheduling tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickReport {
    pub position: f64,
    /// The loop wrapped during this tick
    pub wrapped: bool,
    /// Voice and click starts fired
    pub fired: usize,
}

pub struct Transport {
    state: TransportState,
    bpm: f64,
    anchor: Anchor,
    loop_region: LoopRegion,
    /// The next loop iteration is already queued
    loop_prepared: bool,
    armed: bool,
    click: ClickCursor,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            bpm: clamp_bpm(bpm),
            anchor: Anchor { beats: 0.0, time: 0.0 },
            loop_region: LoopRegion::default(),
            loop_prepared: false,
            armed: false,
            click: ClickCursor { beat: 0, time: 0.0 },
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_rolling(&self) -> bool {
        self.state.is_rolling()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Set by [`record`](Self::record), cleared by stop.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Position in beats at audio time `now`. Frozen unless rolling.
    pub fn position(&self, now: f64) -> f64 {
        let raw = self.raw_position(now);
        if self.is_rolling() && self.loop_region.enabled && self.anchor.beats < self.loop_region.end {
            self.loop_region.wrap(raw)
        } else {
            raw
        }
    }

    /// Audio time at which `beat` plays from the current anchor, ignoring
    /// the loop.
    pub fn time_of(&self, beat: f64) -> f64 {
        self.anchor.time + (beat - self.anchor.beats) / self.bps()
    }

    fn raw_position(&self, now: f64) -> f64 {
        if self.is_rolling() {
            self.anchor.beats + (now - self.anchor.time).max(0.0) * self.bps()
        } else {
            self.anchor.beats
        }
    }

    fn bps(&self) -> f64 {
        beats_per_second(self.bpm)
    }

    fn rebase(&mut self, now: f64) {
        let beats = self.position(now);
        self.anchor = Anchor { beats, time: now };
    }

    fn looping_at(&self, beat: f64) -> bool {
        self.loop_region.enabled && beat < self.loop_region.end
    }

    /// End of the current loop iteration on the audio clock.
    fn loop_end_time(&self) -> f64 {
        self.time_of(self.loop_region.end)
    }

    // --- State changes ---

    /// Start playback from the current position.
    pub fn play(&mut self, s: &mut Session<'_>, now: f64) -> Option<ProjectEvent> {
        match self.state {
            TransportState::Playing | TransportState::Recording => None,
            TransportState::Stopped | TransportState::Paused => {
                self.start_rolling(s, now, TransportState::Playing);
                info!(position = self.anchor.beats, bpm = self.bpm, "play");
                Some(ProjectEvent::Play {
                    position: self.anchor.beats,
                })
            }
        }
    }

    /// Start playback in recording mode, or switch to it while playing.
    pub fn record(&mut self, s: &mut Session<'_>, now: f64) -> Option<ProjectEvent> {
        match self.state {
            TransportState::Recording => return None,
            TransportState::Playing => self.state = TransportState::Recording,
            TransportState::Stopped | TransportState::Paused => {
                self.start_rolling(s, now, TransportState::Recording)
            }
        }
        self.armed = true;
        let position = self.position(now);
        info!(position, "record");
        Some(ProjectEvent::Record { position })
    }

    fn start_rolling(&mut self, s: &mut Session<'_>, now: f64, state: TransportState) {
        self.anchor.time = now;
        self.state = state;
        self.schedule_from_anchor(s, None);
        self.reset_click();
    }

    /// Freeze the position. Unfired starts are cancelled and sounding
    /// voices take their normal release.
    pub fn pause(&mut self, s: &mut Session<'_>, now: f64) -> Option<ProjectEvent> {
        if !self.is_rolling() {
            return None;
        }
        self.rebase(now);
        self.state = TransportState::Paused;
        s.scheduler
            .release_all(s.audio, s.tracks, now, ReleaseMode::Natural);
        info!(position = self.anchor.beats, "pause");
        Some(ProjectEvent::Pause {
            position: self.anchor.beats,
        })
    }

    /// Stop playback, keeping the position. Every voice is cut with a short
    /// release.
    pub fn stop(&mut self, s: &mut Session<'_>, now: f64) -> Option<ProjectEvent> {
        if self.state == TransportState::Stopped {
            return None;
        }
        self.rebase(now);
        self.state = TransportState::Stopped;
        self.armed = false;
        s.scheduler
            .release_all(s.audio, s.tracks, now, ReleaseMode::Forced);
        info!(position = self.anchor.beats, "stop");
        Some(ProjectEvent::Stop {
            position: self.anchor.beats,
        })
    }

    /// Stop and move the position to `beats`.
    pub fn stop_at(&mut self, s: &mut Session<'_>, beats: f64, now: f64) -> ProjectEvent {
        self.stop(s, now);
        self.anchor = Anchor {
            beats: sanitize_beat(beats),
            time: now,
        };
        ProjectEvent::Stop {
            position: self.anchor.beats,
        }
    }

    /// Jump to `beats`. While rolling, sounding voices are cut and playback
    /// resumes from the new position.
    pub fn seek(&mut self, s: &mut Session<'_>, beats: f64, now: f64) -> f64 {
        let beats = sanitize_beat(beats);
        if self.is_rolling() {
            s.scheduler
                .release_all(s.audio, s.tracks, now, ReleaseMode::Forced);
            self.anchor = Anchor { beats, time: now };
            self.schedule_from_anchor(s, None);
            self.reset_click();
        } else {
            self.anchor = Anchor { beats, time: now };
        }
        debug!(beats, "seek");
        beats
    }

    /// Change tempo without moving the position. While rolling, everything
    /// not yet sounding is rescheduled at the new tempo.
    pub fn set_bpm(&mut self, s: &mut Session<'_>, bpm: f64, now: f64) -> Option<ProjectEvent> {
        let bpm = clamp_bpm(bpm);
        if bpm == self.bpm {
            return None;
        }
        self.rebase(now);
        self.bpm = bpm;
        if self.is_rolling() {
            s.scheduler.cancel_pending(s.audio, s.tracks, now, None);
            self.schedule_from_anchor(s, None);
            self.reset_click();
        }
        info!(bpm, "tempo change");
        Some(ProjectEvent::BpmChange { bpm })
    }

    pub fn set_loop(&mut self, s: &mut Session<'_>, region: LoopRegion, now: f64) -> ProjectEvent {
        let region = LoopRegion::new(region.start, region.end, region.enabled);
        self.rebase(now);
        self.loop_region = region;
        if self.is_rolling() {
            s.scheduler.cancel_pending(s.audio, s.tracks, now, None);
            self.schedule_from_anchor(s, None);
            self.reset_click();
        }
        ProjectEvent::LoopChange(region)
    }

    pub fn toggle_loop(&mut self, s: &mut Session<'_>, now: f64) -> ProjectEvent {
        let mut region = self.loop_region;
        region.enabled = !region.enabled;
        self.set_loop(s, region, now)
    }

    /// Requeue one track after its clips or placements changed.
    pub fn reschedule_track(&mut self, s: &mut Session<'_>, track: TrackId, now: f64) {
        if !self.is_rolling() {
            return;
        }
        // Settle a crossing no tick has seen yet, so the next iteration is
        // still queued for every other track.
        self.wrap_loop(s, now);
        self.rebase(now);
        s.scheduler.cancel_pending(s.audio, s.tracks, now, Some(track));
        let prepared = self.loop_prepared;
        self.schedule_from_anchor(s, Some(track));
        if prepared {
            self.prepare_loop(s, Some(track));
        }
    }

    // --- Tick ---

    /// Advance to `now`: wrap the loop, queue the next loop iteration and
    /// metronome clicks inside the lookahead, then fire due voices.
    pub fn advance(&mut self, s: &mut Session<'_>, now: f64) -> TickReport {
        let mut wrapped = false;
        if self.is_rolling() {
            wrapped = self.wrap_loop(s, now);
            let horizon = now + s.scheduler.lookahead();
            if self.loop_region.enabled
                && !self.loop_prepared
                && self.anchor.beats < self.loop_region.end
                && self.raw_position(horizon) >= self.loop_region.end
            {
                self.prepare_loop(s, None);
            }
            self.queue_clicks(s, now, horizon);
        }
        let fired = s.scheduler.process(s.audio, s.tracks, s.clips, now);
        s.audio.prune();
        TickReport {
            position: self.position(now),
            wrapped,
            fired,
        }
    }

    fn wrap_loop(&mut self, s: &mut Session<'_>, now: f64) -> bool {
        let region = self.loop_region;
        let mut wrapped = false;
        let mut missed = false;
        while region.enabled && self.anchor.beats < region.end && self.raw_position(now) >= region.end {
            missed |= !self.loop_prepared;
            self.anchor = Anchor {
                beats: region.start,
                time: self.loop_end_time(),
            };
            self.loop_prepared = false;
            wrapped = true;
        }
        if missed {
            // The tick ran too late to queue this iteration ahead of time.
            self.rebase(now);
            self.schedule_from_anchor(s, None);
        }
        if wrapped {
            debug!(position = self.raw_position(now), "loop wrapped");
        }
        wrapped
    }

    /// Queue `[anchor, loop end)`, or everything from the anchor on when
    /// not looping.
    fn schedule_from_anchor(&mut self, s: &mut Session<'_>, only: Option<TrackId>) {
        let from = self.anchor.beats;
        let until = if self.looping_at(from) {
            self.loop_region.end
        } else {
            f64::INFINITY
        };
        let anchor = self.anchor;
        let scheduled = self.schedule_span(s, anchor, from, until, only);
        if only.is_none() {
            self.loop_prepared = false;
        }
        debug!(from, until, scheduled, "scheduled span");
    }

    /// Queue the loop body for the iteration after the current one.
    fn prepare_loop(&mut self, s: &mut Session<'_>, only: Option<TrackId>) {
        let region = self.loop_region;
        let anchor = Anchor {
            beats: region.start,
            time: self.loop_end_time(),
        };
        let scheduled = self.schedule_span(s, anchor, region.start, region.end, only);
        if only.is_none() {
            self.loop_prepared = true;
        }
        debug!(at = anchor.time, scheduled, "loop iteration queued");
    }

    fn schedule_span(
        &self,
        s: &mut Session<'_>,
        anchor: Anchor,
        from: f64,
        until: f64,
        only: Option<TrackId>,
    ) -> usize {
        let bps = self.bps();
        let mut count = 0;
        for track in s.tracks.iter_mut() {
            if only.is_some_and(|id| id != track.id()) {
                continue;
            }
            let instances = track.instances().to_vec();
            for instance in &instances {
                let Some(clip) = s.clips.get(instance.clip) else {
                    continue;
                };
                let start = instance.start_beat;
                let end = instance.end_beat(clip, self.bpm);
                if end <= from || start >= until {
                    continue;
                }
                let window = Window {
                    t0: anchor.time + (start - anchor.beats) / bps,
                    bpm: self.bpm,
                    from: from - start,
                    until: (until - start).min(end - start),
                    catch_up: true,
                };
                count += s.scheduler.schedule_instance(track, instance, clip, window);
            }
        }
        count
    }

    // --- Metronome ---

    fn reset_click(&mut self) {
        let beat = self.anchor.beats.ceil();
        let mut cursor = ClickCursor {
            beat: beat as u64,
            time: self.time_of(beat),
        };
        let region = self.loop_region;
        if self.looping_at(self.anchor.beats) && beat >= region.end {
            let first = region.start.ceil();
            cursor = ClickCursor {
                beat: first as u64,
                time: self.loop_end_time() + (first - region.start) / self.bps(),
            };
        }
        self.click = cursor;
    }

    fn queue_clicks(&mut self, s: &mut Session<'_>, now: f64, horizon: f64) {
        let spb = 1.0 / self.bps();
        let region = self.loop_region;
        while self.click.time < horizon {
            let ClickCursor { beat, time } = self.click;
            if s.scheduler.metronome().is_enabled() && time >= now - spb {
                let accent = s.time_signature.is_downbeat(beat);
                s.scheduler.schedule_click(time, accent);
            }
            let next = beat + 1;
            self.click = if region.enabled && (beat as f64) < region.end && next as f64 >= region.end {
                let first = region.start.ceil();
                let end_time = time + (region.end - beat as f64) * spb;
                ClickCursor {
                    beat: first as u64,
                    time: end_time + (first - region.start) * spb,
                }
            } else {
                ClickCursor {
                    beat: next,
                    time: time + spb,
                }
            };
        }
    }
}

fn sanitize_beat(beats: f64) -> f64 {
    if beats.is_finite() {
        beats.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoreConfig, MetronomeConfig, VoiceConfig};
    use crate::host::OfflineHost;
    use crate::voice::VoiceState;
    use oc_ir::{ClipInstance, MidiClip, MidiNote, TrackKind};

    struct Rig {
        audio: AudioGraphManager,
        scheduler: VoiceScheduler,
        tracks: Vec<Track>,
        clips: ClipPool,
        transport: Transport,
    }

    impl Rig {
        fn new() -> Self {
            let mut audio = AudioGraphManager::new(Box::new(OfflineHost::new(48_000)), CoreConfig::default());
            audio.init().unwrap();
            let mut track = Track::new("lead", TrackKind::midi());
            track.attach(&audio, audio.master_input());
            Self {
                audio,
                scheduler: VoiceScheduler::new(VoiceConfig::default(), MetronomeConfig::default(), 0.1),
                tracks: vec![track],
                clips: ClipPool::new(),
                transport: Transport::new(120.0),
            }
        }

        fn with_note_at(mut self, instance_beat: f64) -> Self {
            let mut clip = MidiClip::new("c", 2.0);
            clip.add_note(MidiNote::new(69, 127, 0.0, 1.0));
            let id = self.clips.insert(clip);
            self.tracks[0].add_instance(ClipInstance::new(id, instance_beat));
            self
        }

        fn run<R>(&mut self, f: impl FnOnce(&mut Transport, &mut Session<'_>) -> R) -> R {
            let mut session = Session {
                audio: &self.audio,
                scheduler: &mut self.scheduler,
                tracks: &mut self.tracks,
                clips: &self.clips,
                time_signature: TimeSignature::default(),
            };
            f(&mut self.transport, &mut session)
        }
    }

    #[test]
    fn note_fires_at_its_beat() {
        let mut rig = Rig::new().with_note_at(8.0);
        assert!(rig.run(|t, s| t.play(s, 0.0)).is_some());
        assert_eq!(rig.tracks[0].voice_count(), 1);

        rig.run(|t, s| t.advance(s, 3.85));
        let (_, v) = rig.tracks[0].voices().next().unwrap();
        assert_eq!(v.state, VoiceState::Pending);

        rig.run(|t, s| t.advance(s, 3.95));
        let (_, v) = rig.tracks[0].voices().next().unwrap();
        assert_eq!(v.state, VoiceState::Active);
        assert!((v.starts_at - 4.0).abs() < 1e-9);
        assert!((v.release_start - 4.2).abs() < 1e-9);
        assert!((v.ends_at - 4.5).abs() < 1e-9);

        rig.run(|t, s| t.advance(s, 4.6));
        assert_eq!(rig.tracks[0].voice_count(), 0);
    }

    #[test]
    fn position_follows_tempo() {
        let mut rig = Rig::new();
        rig.run(|t, s| t.play(s, 0.0));
        assert!((rig.transport.position(1.0) - 2.0).abs() < 1e-9);
        rig.run(|t, s| t.set_bpm(s, 60.0, 1.0));
        assert!((rig.transport.position(1.0) - 2.0).abs() < 1e-9);
        assert!((rig.transport.position(2.0) - 3.0).abs() < 1e-9);
        assert!(rig.run(|t, s| t.set_bpm(s, 60.0, 2.0)).is_none());
    }

    #[test]
    fn tempo_change_reschedules_pending_notes() {
        let mut rig = Rig::new().with_note_at(8.0);
        rig.run(|t, s| t.play(s, 0.0));
        rig.run(|t, s| t.set_bpm(s, 60.0, 1.0));
        assert_eq!(rig.tracks[0].voice_count(), 1);
        // beat 2 at t=1, beat 8 six seconds later
        assert_eq!(rig.scheduler.next_start(), Some(7.0));
    }

    #[test]
    fn pause_freezes_and_stop_keeps_position() {
        let mut rig = Rig::new().with_note_at(8.0);
        rig.run(|t, s| t.play(s, 0.0));
        assert!(rig.run(|t, s| t.pause(s, 1.0)).is_some());
        assert_eq!(rig.transport.position(5.0), 2.0);
        assert_eq!(rig.tracks[0].voice_count(), 0);
        assert_eq!(rig.scheduler.pending_starts(), 0);
        assert!(rig.run(|t, s| t.pause(s, 2.0)).is_none());

        rig.run(|t, s| t.play(s, 10.0));
        assert!((rig.transport.position(11.0) - 4.0).abs() < 1e-9);
        rig.run(|t, s| t.stop(s, 11.0));
        assert!((rig.transport.position(20.0) - 4.0).abs() < 1e-9);
        rig.run(|t, s| t.stop_at(s, 0.0, 20.0));
        assert_eq!(rig.transport.position(30.0), 0.0);
        assert_eq!(rig.transport.state(), TransportState::Stopped);
    }

    #[test]
    fn record_switches_mode_while_playing() {
        let mut rig = Rig::new();
        rig.run(|t, s| t.play(s, 0.0));
        assert!(matches!(rig.run(|t, s| t.record(s, 1.0)), Some(ProjectEvent::Record { .. })));
        assert_eq!(rig.transport.state(), TransportState::Recording);
        assert!(rig.transport.is_armed());
        assert!(rig.run(|t, s| t.record(s, 1.5)).is_none());
        assert!(rig.transport.is_rolling());
        rig.run(|t, s| t.stop(s, 2.0));
        assert!(!rig.transport.is_armed());
    }

    #[test]
    fn loop_wraps_within_bounds() {
        let mut rig = Rig::new();
        rig.run(|t, s| t.set_loop(s, LoopRegion::new(0.0, 4.0, true), 0.0));
        rig.run(|t, s| t.play(s, 0.0));
        let mut now = 0.0;
        let mut wraps = 0;
        while now < 10.0 {
            let report = rig.run(|t, s| t.advance(s, now));
            assert!(report.position >= 0.0 && report.position < 4.0);
            wraps += report.wrapped as usize;
            now += 0.025;
        }
        assert_eq!(wraps, 4);
    }

    #[test]
    fn loop_body_is_queued_ahead_of_the_wrap() {
        let mut rig = Rig::new().with_note_at(0.0);
        rig.run(|t, s| t.set_loop(s, LoopRegion::new(0.0, 4.0, true), 0.0));
        rig.run(|t, s| t.play(s, 0.0));
        rig.run(|t, s| t.advance(s, 0.0));
        rig.run(|t, s| t.advance(s, 1.95));
        assert_eq!(rig.tracks[0].voice_count(), 1);
        let (_, v) = rig.tracks[0].voices().next().unwrap();
        assert!((v.starts_at - 2.0).abs() < 1e-9);
    }

    #[test]
    fn seek_while_rolling_restarts_from_target() {
        let mut rig = Rig::new().with_note_at(8.0);
        rig.run(|t, s| t.play(s, 0.0));
        rig.run(|t, s| t.seek(s, 7.0, 1.0));
        assert!((rig.transport.position(1.5) - 8.0).abs() < 1e-9);
        assert_eq!(rig.scheduler.next_start(), Some(1.5));
        assert_eq!(rig.tracks[0].voice_count(), 1);
    }

    #[test]
    fn notes_before_play_position_are_skipped() {
        let mut rig = Rig::new().with_note_at(0.0);
        rig.run(|t, s| t.seek(s, 0.5, 0.0));
        rig.run(|t, s| t.play(s, 0.0));
        assert_eq!(rig.tracks[0].voice_count(), 0);
    }

    #[test]
    fn metronome_clicks_on_beats() {
        let mut rig = Rig::new();
        rig.scheduler.metronome_mut().set_enabled(true);
        let before = rig.audio.with_graph(|g| g.len()).unwrap();
        rig.run(|t, s| t.play(s, 0.0));
        rig.run(|t, s| t.advance(s, 0.0));
        assert_eq!(rig.audio.with_graph(|g| g.len()), Some(before + 2));
        rig.run(|t, s| t.advance(s, 0.2));
        assert_eq!(rig.audio.with_graph(|g| g.len()), Some(before));
    }

    #[test]
    fn reschedule_track_picks_up_new_instances() {
        let mut rig = Rig::new();
        rig.run(|t, s| t.play(s, 0.0));
        let mut clip = MidiClip::new("late", 1.0);
        clip.add_note(MidiNote::new(60, 100, 0.0, 0.5));
        let id = rig.clips.insert(clip);
        rig.tracks[0].add_instance(ClipInstance::new(id, 4.0));
        let track = rig.tracks[0].id();
        rig.run(|t, s| t.reschedule_track(s, track, 0.5));
        assert_eq!(rig.tracks[0].voice_count(), 1);
        assert_eq!(rig.scheduler.next_start(), Some(2.0));
    }

    #[test]
    fn notes_past_clip_length_still_play() {
        let mut rig = Rig::new();
        let mut clip = MidiClip::new("short", 2.0);
        clip.add_note(MidiNote::new(60, 100, 3.0, 0.5));
        let id = rig.clips.insert(clip);
        rig.tracks[0].add_instance(ClipInstance::new(id, 0.0));
        rig.run(|t, s| t.play(s, 0.0));
        assert_eq!(rig.tracks[0].voice_count(), 1);
        assert_eq!(rig.scheduler.next_start(), Some(1.5));
    }

    #[test]
    fn reschedule_after_unticked_wrap_keeps_other_tracks() {
        let mut rig = Rig::new().with_note_at(0.0);
        let clip = rig.tracks[0].instances()[0].clip;
        let mut other = Track::new("other", TrackKind::midi());
        other.attach(&rig.audio, rig.audio.master_input());
        other.add_instance(ClipInstance::new(clip, 0.0));
        rig.tracks.push(other);
        let lead = rig.tracks[0].id();

        rig.run(|t, s| t.set_loop(s, LoopRegion::new(0.0, 4.0, true), 0.0));
        rig.run(|t, s| t.play(s, 0.0));
        rig.run(|t, s| t.advance(s, 0.0));
        rig.run(|t, s| t.advance(s, 1.95));
        // The clock passes the loop end before the next tick runs.
        rig.run(|t, s| t.reschedule_track(s, lead, 2.01));
        assert!((rig.transport.position(2.01) - 0.02).abs() < 1e-9);

        rig.run(|t, s| t.advance(s, 3.95));
        for track in &rig.tracks {
            assert!(
                track.voices().any(|(_, v)| (v.starts_at - 4.0).abs() < 1e-9),
                "{} lost its next iteration",
                track.name
            );
        }
    }
}
