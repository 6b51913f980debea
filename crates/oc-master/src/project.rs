//! The project: tracks, clips and tempo, driven through one transport.

use std::sync::Arc;

use oc_engine::{
    update_audibility, AudioGraphManager, AudioHost, EngineConfig, EngineError, Frame, Level,
    OfflineHost, Session, TickReport, Track, Transport, VoiceId, VoiceScheduler,
};
use oc_formats::FormatError;
use oc_ir::{
    AudioClip, Clip, ClipId, ClipInstance, ClipPool, EventKind, InstanceId, LoopRegion, MidiClip,
    MidiNote, NoteId, ProjectData, ProjectEvent, TimeSignature, TrackBehavior, TrackId, TrackKind,
    TransportState,
};
use tracing::{debug, info, warn};

use crate::listeners::{ListenerId, Listeners};

/// Error type for project operations that touch audio or files.
#[derive(Debug)]
pub enum ProjectError {
    Engine(EngineError),
    Format(FormatError),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::Engine(e) => write!(f, "{}", e),
            ProjectError::Format(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProjectError::Engine(e) => Some(e),
            ProjectError::Format(e) => Some(e),
        }
    }
}

impl From<EngineError> for ProjectError {
    fn from(e: EngineError) -> Self {
        ProjectError::Engine(e)
    }
}

impl From<FormatError> for ProjectError {
    fn from(e: FormatError) -> Self {
        ProjectError::Format(e)
    }
}

/// Headless project controller. Owns the engine context and everything on
/// the timeline.
pub struct Project {
    name: String,
    config: EngineConfig,
    audio: AudioGraphManager,
    scheduler: VoiceScheduler,
    transport: Transport,
    tracks: Vec<Track>,
    clips: ClipPool,
    time_signature: TimeSignature,
    listeners: Listeners,
}

impl Project {
    /// Create an empty project on `host`. Audio that fails to start is
    /// tolerated; the timeline keeps working without sound.
    pub fn new(config: EngineConfig, host: Box<dyn AudioHost>) -> Self {
        let mut audio = AudioGraphManager::new(host, config.core.clone());
        if let Err(e) = audio.init() {
            warn!(error = %e, "starting without audio");
        }
        let scheduler = VoiceScheduler::new(
            config.voice.clone(),
            config.metronome.clone(),
            config.core.lookahead(),
        );
        Self {
            name: String::from("Untitled"),
            config,
            audio,
            scheduler,
            transport: Transport::default(),
            tracks: Vec::new(),
            clips: ClipPool::new(),
            time_signature: TimeSignature::default(),
            listeners: Listeners::new(),
        }
    }

    /// A project rendering on demand at the configured sample rate.
    pub fn offline(config: EngineConfig) -> Self {
        let rate = config.core.sample_rate;
        Self::new(config, Box::new(OfflineHost::new(rate)))
    }

    /// Rebuild a project from persisted data. MIDI notes are re-sorted.
    /// Instances of unknown clips and outputs to unknown buses are dropped
    /// with a warning.
    pub fn from_data(data: ProjectData, config: EngineConfig, host: Box<dyn AudioHost>) -> Self {
        let mut project = Self::new(config, host);
        project.name = data.name;
        project.time_signature = TimeSignature::new(
            data.time_signature.beats_per_bar,
            data.time_signature.beat_unit,
        );
        project.transport = Transport::new(data.bpm);
        project.with_transport(|t, s, now| t.set_loop(s, data.loop_region, now));
        project.scheduler.metronome_mut().set_enabled(data.metronome);
        project.audio.set_master_volume(data.master_volume);

        for mut clip in data.clips {
            if let Some(midi) = clip.as_midi_mut() {
                midi.normalize();
            }
            project.clips.insert(clip);
        }
        let ids: Vec<TrackId> = data.tracks.iter().map(|t| t.id).collect();
        for track_data in data.tracks {
            let mut track = Track::from_data(track_data);
            let clips = &project.clips;
            let missing: Vec<InstanceId> = track
                .instances()
                .iter()
                .filter(|i| !clips.contains(i.clip))
                .map(|i| i.id())
                .collect();
            for id in missing {
                warn!(track = %track.id(), instance = %id, "dropping instance of unknown clip");
                track.remove_instance(id);
            }
            if let Some(output) = track.output() {
                if !ids.contains(&output) || output == track.id() {
                    warn!(track = %track.id(), bus = %output, "dropping unknown output");
                    track.set_output(None);
                }
            }
            if let TrackKind::Bus(bus) = &mut track.kind {
                bus.children.retain(|c| ids.contains(c));
            }
            project.tracks.push(track);
        }
        // Outputs must point at buses and bus child lists must match them.
        let buses: Vec<TrackId> = project
            .tracks
            .iter()
            .filter(|t| t.kind.behavior().is_bus())
            .map(|t| t.id())
            .collect();
        for track in project.tracks.iter_mut() {
            if track.output().is_some_and(|o| !buses.contains(&o)) {
                warn!(track = %track.id(), "output is not a bus");
                track.set_output(None);
            }
        }
        project.sync_bus_children();
        if project.has_routing_cycle() {
            warn!("bus routing cycle, sending all tracks to master");
            for track in project.tracks.iter_mut() {
                track.set_output(None);
            }
            project.sync_bus_children();
        }
        project.rebuild_routing();
        update_audibility(&mut project.tracks, &project.audio);
        info!(name = %project.name, tracks = project.tracks.len(), clips = project.clips.len(), "project loaded");
        project
    }

    /// Persistable snapshot of the project.
    pub fn to_data(&self) -> ProjectData {
        let mut clips: Vec<Clip> = self.clips.iter().cloned().collect();
        clips.sort_by_key(Clip::id);
        ProjectData {
            name: self.name.clone(),
            bpm: self.transport.bpm(),
            time_signature: self.time_signature,
            loop_region: self.transport.loop_region(),
            metronome: self.scheduler.metronome().is_enabled(),
            master_volume: self.audio.master_volume(),
            tracks: self.tracks.iter().map(Track::to_data).collect(),
            clips,
        }
    }

    /// Stop playback and release the audio device.
    pub fn close(mut self) {
        self.stop();
        self.audio.teardown();
        info!(name = %self.name, "project closed");
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn audio(&self) -> &AudioGraphManager {
        &self.audio
    }

    pub fn now(&self) -> f64 {
        self.audio.now()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn position(&self) -> f64 {
        self.transport.position(self.audio.now())
    }

    pub fn bpm(&self) -> f64 {
        self.transport.bpm()
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.transport.loop_region()
    }

    pub fn metronome_enabled(&self) -> bool {
        self.scheduler.metronome().is_enabled()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn clips(&self) -> &ClipPool {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn master_level(&self) -> Level {
        self.audio.master_level()
    }

    // --- Listeners ---

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: FnMut(&ProjectEvent) + Send + 'static,
    {
        self.listeners.subscribe(kind, Box::new(callback))
    }

    pub fn subscribe_all<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(&ProjectEvent) + Send + 'static,
    {
        self.listeners.subscribe_all(Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    fn emit(&mut self, event: Option<ProjectEvent>) {
        if let Some(event) = event {
            self.listeners.emit(&event);
        }
    }

    fn with_transport<R>(&mut self, f: impl FnOnce(&mut Transport, &mut Session<'_>, f64) -> R) -> R {
        let now = self.audio.now();
        let mut session = Session {
            audio: &self.audio,
            scheduler: &mut self.scheduler,
            tracks: &mut self.tracks,
            clips: &self.clips,
            time_signature: self.time_signature,
        };
        f(&mut self.transport, &mut session, now)
    }

    // --- Transport ---

    pub fn play(&mut self) {
        self.wake_audio();
        let event = self.with_transport(|t, s, now| t.play(s, now));
        self.emit(event);
    }

    pub fn pause(&mut self) {
        let event = self.with_transport(|t, s, now| t.pause(s, now));
        self.emit(event);
    }

    pub fn stop(&mut self) {
        let event = self.with_transport(|t, s, now| t.stop(s, now));
        self.emit(event);
    }

    /// Stop and move the position to `beats`.
    pub fn stop_at(&mut self, beats: f64) {
        let event = self.with_transport(|t, s, now| t.stop_at(s, beats, now));
        self.emit(Some(event));
    }

    pub fn record(&mut self) {
        self.wake_audio();
        let event = self.with_transport(|t, s, now| t.record(s, now));
        self.emit(event);
    }

    pub fn seek(&mut self, beats: f64) {
        let position = self.with_transport(|t, s, now| t.seek(s, beats, now));
        self.emit(Some(ProjectEvent::Tick { position }));
    }

    /// Run one scheduling tick against the audio clock.
    pub fn tick(&mut self) -> TickReport {
        let report = self.with_transport(|t, s, now| t.advance(s, now));
        if self.transport.is_rolling() {
            self.emit(Some(ProjectEvent::Tick {
                position: report.position,
            }));
        }
        report
    }

    fn wake_audio(&mut self) {
        if !self.audio.is_available() {
            if let Err(e) = self.audio.init() {
                debug!(error = %e, "audio still unavailable");
            }
            self.rebuild_routing();
            update_audibility(&mut self.tracks, &self.audio);
        }
        if self.audio.is_suspended() {
            if let Err(e) = self.audio.resume() {
                warn!(error = %e, "audio resume failed");
            }
        }
    }

    // --- Tempo, meter, loop ---

    /// Set the tempo, clamped to the supported range. Returns the value used.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let event = self.with_transport(|t, s, now| t.set_bpm(s, bpm, now));
        self.emit(event);
        self.transport.bpm()
    }

    pub fn set_time_signature(&mut self, beats_per_bar: u8, beat_unit: u8) {
        let ts = TimeSignature::new(beats_per_bar, beat_unit);
        if ts != self.time_signature {
            self.time_signature = ts;
            self.emit(Some(ProjectEvent::TimeSignatureChange(ts)));
        }
    }

    pub fn set_loop(&mut self, start: f64, end: f64, enabled: bool) -> LoopRegion {
        let region = LoopRegion::new(start, end, enabled);
        let event = self.with_transport(|t, s, now| t.set_loop(s, region, now));
        self.emit(Some(event));
        self.transport.loop_region()
    }

    pub fn toggle_loop(&mut self) -> bool {
        let event = self.with_transport(|t, s, now| t.toggle_loop(s, now));
        self.emit(Some(event));
        self.transport.loop_region().enabled
    }

    pub fn set_metronome(&mut self, enabled: bool) {
        if self.scheduler.metronome().is_enabled() != enabled {
            self.scheduler.metronome_mut().set_enabled(enabled);
            self.emit(Some(ProjectEvent::MetronomeChange { enabled }));
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.audio.set_master_volume(volume);
        self.audio.master_volume()
    }

    // --- Tracks ---

    pub fn add_track(&mut self, name: &str, kind: TrackKind) -> TrackId {
        let mut track = Track::new(name, kind);
        track.attach(&self.audio, self.audio.master_input());
        let id = track.id();
        self.tracks.push(track);
        update_audibility(&mut self.tracks, &self.audio);
        debug!(track = %id, name, "track added");
        self.emit(Some(ProjectEvent::TrackAdded(id)));
        id
    }

    pub fn remove_track(&mut self, id: TrackId) -> bool {
        let Some(idx) = self.tracks.iter().position(|t| t.id() == id) else {
            return false;
        };
        self.scheduler.forget_track(id);
        let mut track = self.tracks.remove(idx);
        track.detach(&self.audio);
        let master = self.audio.master_input();
        for other in self.tracks.iter_mut() {
            if other.output() == Some(id) {
                other.set_output(None);
                other.route_to(&self.audio, master);
            }
            if let TrackKind::Bus(bus) = &mut other.kind {
                bus.children.retain(|c| *c != id);
            }
        }
        update_audibility(&mut self.tracks, &self.audio);
        self.emit(Some(ProjectEvent::TrackRemoved(id)));
        true
    }

    pub fn rename_track(&mut self, id: TrackId, name: &str) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        track.name.clear();
        for ch in name.chars() {
            if track.name.try_push(ch).is_err() {
                break;
            }
        }
        true
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id() == id)
    }

    /// Set track volume, clamped to `[0, 1]`. Returns the value used.
    pub fn set_volume(&mut self, id: TrackId, volume: f32) -> Option<f32> {
        let track = self.tracks.iter_mut().find(|t| t.id() == id)?;
        Some(track.set_volume(&self.audio, volume))
    }

    /// Set track pan, clamped to `[-1, 1]`. Returns the value used.
    pub fn set_pan(&mut self, id: TrackId, pan: f32) -> Option<f32> {
        let track = self.tracks.iter_mut().find(|t| t.id() == id)?;
        Some(track.set_pan(&self.audio, pan))
    }

    pub fn set_muted(&mut self, id: TrackId, muted: bool) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        let unmuted = track.mix().muted && !muted;
        track.set_muted(muted);
        update_audibility(&mut self.tracks, &self.audio);
        // Muted tracks get no voices, so queue what is still ahead.
        if unmuted {
            self.reschedule(&[id]);
        }
        true
    }

    pub fn set_solo(&mut self, id: TrackId, solo: bool) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        track.set_solo(solo);
        update_audibility(&mut self.tracks, &self.audio);
        true
    }

    pub fn set_armed(&mut self, id: TrackId, armed: bool) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        track.set_armed(armed);
        true
    }

    /// Route a track into a bus, or back to master with `None`. Fails for
    /// unknown tracks, non-bus targets and routes that would form a cycle.
    pub fn set_output(&mut self, id: TrackId, bus: Option<TrackId>) -> bool {
        if self.track(id).is_none() {
            return false;
        }
        if let Some(bus) = bus {
            let is_bus = self.track(bus).is_some_and(|t| t.kind.behavior().is_bus());
            if bus == id || !is_bus || self.feeds_into(bus, id) {
                return false;
            }
        }
        let target = match bus {
            Some(bus) => self.track(bus).and_then(Track::input),
            None => self.audio.master_input(),
        };
        if let Some(track) = self.track_mut(id) {
            track.set_output(bus);
        }
        if let Some(track) = self.track(id) {
            track.route_to(&self.audio, target);
        }
        self.sync_bus_children();
        true
    }

    /// Whether `from` reaches `to` by following outputs.
    fn feeds_into(&self, from: TrackId, to: TrackId) -> bool {
        let mut current = Some(from);
        let mut steps = 0;
        while let Some(id) = current {
            if id == to {
                return true;
            }
            steps += 1;
            if steps > self.tracks.len() {
                return true;
            }
            current = self.track(id).and_then(Track::output);
        }
        false
    }

    fn has_routing_cycle(&self) -> bool {
        self.tracks.iter().any(|t| {
            t.output()
                .is_some_and(|bus| self.feeds_into(bus, t.id()))
        })
    }

    fn sync_bus_children(&mut self) {
        let routes: Vec<(TrackId, Option<TrackId>)> =
            self.tracks.iter().map(|t| (t.id(), t.output())).collect();
        for track in self.tracks.iter_mut() {
            let id = track.id();
            if let TrackKind::Bus(bus) = &mut track.kind {
                bus.children = routes
                    .iter()
                    .filter(|(_, out)| *out == Some(id))
                    .map(|(child, _)| *child)
                    .collect();
            }
        }
    }

    fn rebuild_routing(&mut self) {
        for track in self.tracks.iter_mut() {
            track.attach(&self.audio, None);
        }
        let master = self.audio.master_input();
        for track in &self.tracks {
            let target = match track.output() {
                Some(bus) => self.track(bus).and_then(Track::input),
                None => master,
            };
            track.route_to(&self.audio, target);
        }
    }

    // --- Clips ---

    pub fn add_clip(&mut self, clip: impl Into<Clip>) -> ClipId {
        let id = self.clips.insert(clip);
        self.emit(Some(ProjectEvent::ClipAdded(id)));
        id
    }

    pub fn create_midi_clip(&mut self, name: &str, length: f64) -> ClipId {
        self.add_clip(MidiClip::new(name, length))
    }

    /// Decode a WAV file into a new audio clip. Transport state is left
    /// alone whether or not decoding succeeds.
    pub fn import_audio(&mut self, name: &str, bytes: &[u8]) -> Result<ClipId, FormatError> {
        let data = oc_formats::decode_wav(bytes)?;
        info!(name, frames = data.frames(), sample_rate = data.sample_rate(), "audio imported");
        Ok(self.add_clip(AudioClip::new(name, Arc::new(data))))
    }

    /// Deep-copy a clip under a new id with fresh note ids.
    pub fn duplicate_clip(&mut self, id: ClipId) -> Option<ClipId> {
        let copy = self.clips.get(id)?.duplicate();
        Some(self.add_clip(copy))
    }

    /// Remove a clip and every placement of it.
    pub fn remove_clip(&mut self, id: ClipId) -> bool {
        if self.clips.remove(id).is_none() {
            return false;
        }
        let affected: Vec<TrackId> = self
            .tracks
            .iter_mut()
            .filter_map(|t| (t.remove_instances_of(id) > 0).then(|| t.id()))
            .collect();
        self.reschedule(&affected);
        self.emit(Some(ProjectEvent::ClipRemoved(id)));
        true
    }

    pub fn set_clip_length(&mut self, id: ClipId, length: f64) -> bool {
        let Some(clip) = self.clips.midi_mut(id) else {
            return false;
        };
        clip.set_length(length);
        self.reschedule_users(id);
        true
    }

    pub fn add_note(&mut self, clip: ClipId, note: MidiNote) -> Option<NoteId> {
        let id = self.clips.midi_mut(clip)?.add_note(note);
        self.reschedule_users(clip);
        Some(id)
    }

    pub fn remove_note(&mut self, clip: ClipId, note: NoteId) -> Option<MidiNote> {
        let removed = self.clips.midi_mut(clip)?.remove_note(note)?;
        self.reschedule_users(clip);
        Some(removed)
    }

    pub fn update_note(&mut self, clip: ClipId, note: NoteId, edit: impl FnOnce(&mut MidiNote)) -> bool {
        let changed = self
            .clips
            .midi_mut(clip)
            .is_some_and(|c| c.update_note(note, edit));
        if changed {
            self.reschedule_users(clip);
        }
        changed
    }

    // --- Placements ---

    /// Place `clip` on a track at `start_beat`. Fails for unknown ids and
    /// clips the track kind cannot play.
    pub fn place_clip(&mut self, track: TrackId, clip: ClipId, start_beat: f64) -> Option<InstanceId> {
        let accepted = self.clips.get(clip)?;
        let target = self.tracks.iter_mut().find(|t| t.id() == track)?;
        if !target.kind.accepts(accepted) {
            return None;
        }
        let start = if start_beat.is_finite() { start_beat.max(0.0) } else { 0.0 };
        let id = target.add_instance(ClipInstance::new(clip, start));
        self.reschedule(&[track]);
        Some(id)
    }

    pub fn remove_instance(&mut self, track: TrackId, instance: InstanceId) -> bool {
        let removed = self
            .track_mut(track)
            .and_then(|t| t.remove_instance(instance))
            .is_some();
        if removed {
            self.reschedule(&[track]);
        }
        removed
    }

    pub fn move_instance(&mut self, track: TrackId, instance: InstanceId, start_beat: f64) -> bool {
        let moved = self
            .track_mut(track)
            .is_some_and(|t| t.move_instance(instance, start_beat));
        if moved {
            self.reschedule(&[track]);
        }
        moved
    }

    fn reschedule_users(&mut self, clip: ClipId) {
        let users: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|t| t.instances().iter().any(|i| i.clip == clip))
            .map(Track::id)
            .collect();
        self.reschedule(&users);
    }

    fn reschedule(&mut self, tracks: &[TrackId]) {
        if !self.transport.is_rolling() {
            return;
        }
        for &id in tracks {
            self.with_transport(|t, s, now| t.reschedule_track(s, id, now));
        }
    }

    // --- Live input ---

    /// Start a sustained note on a track now.
    pub fn note_on(&mut self, track: TrackId, pitch: u8, velocity: u8) -> Option<VoiceId> {
        let now = self.audio.now();
        let target = self.tracks.iter_mut().find(|t| t.id() == track)?;
        let voice = self.scheduler.note_on(target, pitch, velocity, now)?;
        self.scheduler.process(&self.audio, &mut self.tracks, &self.clips, now);
        Some(voice)
    }

    /// Release every live note of `pitch` on a track. Returns how many.
    pub fn note_off(&mut self, track: TrackId, pitch: u8) -> usize {
        let now = self.audio.now();
        let Some(target) = self.tracks.iter_mut().find(|t| t.id() == track) else {
            return 0;
        };
        self.scheduler.stop_note_by_midi(&self.audio, target, pitch, now)
    }

    // --- Offline rendering ---

    /// Render `seconds` of audio, ticking the scheduler at the configured
    /// interval of audio time.
    pub fn render_offline(&mut self, seconds: f64) -> Result<Vec<Frame>, EngineError> {
        let rate = self.audio.sample_rate().ok_or(EngineError::NotInitialized)?;
        let total = (seconds.max(0.0) * rate as f64).round() as usize;
        let chunk = ((self.config.core.tick_interval() * rate as f64) as usize).max(1);
        let mut frames = Vec::with_capacity(total);
        while frames.len() < total {
            self.tick();
            let n = chunk.min(total - frames.len());
            frames.extend(self.audio.render_offline(n)?);
        }
        self.tick();
        Ok(frames)
    }

    /// Render `seconds` of audio and encode it as 16-bit stereo WAV.
    pub fn export_wav(&mut self, seconds: f64) -> Result<Vec<u8>, ProjectError> {
        let rate = self.audio.sample_rate().ok_or(EngineError::NotInitialized)?;
        let frames = self.render_offline(seconds)?;
        Ok(oc_formats::frames_to_wav(&frames, rate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oc_engine::UnavailableHost;
    use std::sync::Mutex;

    fn offline() -> Project {
        let mut config = EngineConfig::default();
        config.core.sample_rate = 48_000;
        Project::offline(config)
    }

    #[test]
    fn events_reach_listeners() {
        let mut project = offline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        project.subscribe_all(move |e| s.lock().unwrap().push(e.kind()));
        let track = project.add_track("lead", TrackKind::midi());
        project.set_bpm(90.0);
        project.set_bpm(90.0);
        project.play();
        project.play();
        project.tick();
        project.stop();
        project.remove_track(track);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventKind::TrackAdded,
                EventKind::BpmChange,
                EventKind::Play,
                EventKind::Tick,
                EventKind::Stop,
                EventKind::TrackRemoved,
            ]
        );
    }

    #[test]
    fn bpm_is_clamped() {
        let mut project = offline();
        assert_eq!(project.set_bpm(-5.0), 20.0);
        assert_eq!(project.set_bpm(5000.0), 999.0);
    }

    #[test]
    fn clips_only_land_on_matching_tracks() {
        let mut project = offline();
        let midi = project.add_track("m", TrackKind::midi());
        let bus = project.add_track("b", TrackKind::bus());
        let clip = project.create_midi_clip("c", 4.0);
        assert!(project.place_clip(midi, clip, 2.0).is_some());
        assert!(project.place_clip(bus, clip, 2.0).is_none());
        assert!(project.place_clip(midi, ClipId::new(), 0.0).is_none());
        assert!(project.remove_clip(clip));
        assert!(project.track(midi).unwrap().instances().is_empty());
    }

    #[test]
    fn bus_routing_rejects_cycles() {
        let mut project = offline();
        let a = project.add_track("a", TrackKind::bus());
        let b = project.add_track("b", TrackKind::bus());
        let synth = project.add_track("s", TrackKind::midi());
        assert!(project.set_output(synth, Some(a)));
        assert!(project.set_output(a, Some(b)));
        assert!(!project.set_output(b, Some(a)));
        assert!(!project.set_output(a, Some(synth)));
        assert!(!project.set_output(a, Some(a)));
        match &project.track(a).unwrap().kind {
            TrackKind::Bus(bus) => assert_eq!(bus.children, vec![synth]),
            _ => unreachable!(),
        }
        project.remove_track(a);
        assert_eq!(project.track(synth).unwrap().output(), None);
    }

    #[test]
    fn timeline_works_without_audio() {
        let mut project = Project::new(EngineConfig::default(), Box::new(UnavailableHost));
        assert!(!project.audio().is_available());
        let track = project.add_track("t", TrackKind::midi());
        let clip = project.create_midi_clip("c", 4.0);
        project.add_note(clip, MidiNote::new(60, 100, 0.0, 1.0));
        project.place_clip(track, clip, 0.0);
        project.play();
        assert_eq!(project.state(), TransportState::Playing);
        assert!(project.render_offline(0.1).is_err());
        assert_eq!(project.set_volume(track, 3.0), Some(1.0));
        assert_eq!(project.set_pan(TrackId::new(), 0.0), None);
        assert_eq!(project.master_level(), Level::Silent);
    }

    #[test]
    fn note_edits_while_playing_reschedule() {
        let mut project = offline();
        let track = project.add_track("t", TrackKind::midi());
        let clip = project.create_midi_clip("c", 8.0);
        project.place_clip(track, clip, 0.0);
        project.play();
        assert_eq!(project.track(track).unwrap().voice_count(), 0);
        let note = project.add_note(clip, MidiNote::new(60, 100, 4.0, 1.0)).unwrap();
        assert_eq!(project.track(track).unwrap().voice_count(), 1);
        assert!(project.update_note(clip, note, |n| n.start = 6.0));
        assert_eq!(project.track(track).unwrap().voice_count(), 1);
        assert!(project.remove_note(clip, note).is_some());
        assert_eq!(project.track(track).unwrap().voice_count(), 0);
    }

    #[test]
    fn duplicated_clip_is_independent() {
        let mut project = offline();
        let clip = project.create_midi_clip("a", 4.0);
        let note = project.add_note(clip, MidiNote::new(60, 100, 1.0, 1.0)).unwrap();
        let copy = project.duplicate_clip(clip).unwrap();
        assert_ne!(copy, clip);
        assert!(project.update_note(clip, note, |n| n.pitch = 72));
        let copied = project.clips().midi(copy).unwrap();
        assert_eq!(copied.notes().len(), 1);
        assert_eq!(copied.notes()[0].pitch, 60);
        assert!(copied.note(note).is_none());
    }
}
