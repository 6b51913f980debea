//! Runtime tracks: mix state, clip placements, routing and active voices.

use arrayvec::ArrayString;
use oc_ir::{ClipInstance, InstanceId, MixState, TrackData, TrackId, TrackKind};
use slotmap::SlotMap;

use crate::graph::NodeId;
use crate::manager::AudioGraphManager;
use crate::node::ParamKind;
use crate::voice::{Voice, VoiceId};

/// input gain -> volume gain -> panner -> output
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Routing {
    pub input: NodeId,
    pub volume: NodeId,
    pub panner: NodeId,
}

pub struct Track {
    id: TrackId,
    pub name: ArrayString<32>,
    pub kind: TrackKind,
    mix: MixState,
    audible: bool,
    output: Option<TrackId>,
    instances: Vec<ClipInstance>,
    pub(crate) voices: SlotMap<VoiceId, Voice>,
    routing: Option<Routing>,
}

impl Track {
    pub fn new(name: &str, kind: TrackKind) -> Self {
        let mut short = ArrayString::new();
        for ch in name.chars() {
            if short.try_push(ch).is_err() {
                break;
            }
        }
        Self::with_id(TrackId::new(), short, kind)
    }

    fn with_id(id: TrackId, name: ArrayString<32>, kind: TrackKind) -> Self {
        Self {
            id,
            name,
            kind,
            mix: MixState::default(),
            audible: true,
            output: None,
            instances: Vec::new(),
            voices: SlotMap::with_key(),
            routing: None,
        }
    }

    /// Rebuild a track from persisted data. Routing is built separately.
    pub fn from_data(data: TrackData) -> Self {
        let mut track = Self::with_id(data.id, data.name, data.kind);
        let mut mix = data.mix;
        mix.set_volume(mix.volume());
        mix.set_pan(mix.pan());
        track.mix = mix;
        track.output = data.output;
        for instance in data.instances {
            track.insert_instance(instance);
        }
        track
    }

    pub fn to_data(&self) -> TrackData {
        TrackData {
            id: self.id,
            name: self.name,
            kind: self.kind.clone(),
            mix: self.mix,
            output: self.output,
            instances: self.instances.clone(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn mix(&self) -> &MixState {
        &self.mix
    }

    pub fn is_audible(&self) -> bool {
        self.audible
    }

    pub fn output(&self) -> Option<TrackId> {
        self.output
    }

    pub fn routing(&self) -> Option<Routing> {
        self.routing
    }

    /// Node voices and child tracks connect into.
    pub fn input(&self) -> Option<NodeId> {
        self.routing.map(|r| r.input)
    }

    // --- Routing ---

    /// Build the routing chain if needed and connect it into `target`.
    pub fn attach(&mut self, audio: &AudioGraphManager, target: Option<NodeId>) {
        if self.routing.is_none() {
            let (Some(input), Some(volume), Some(panner)) = (
                audio.create_gain(1.0),
                audio.create_gain(self.effective_gain()),
                audio.create_panner(self.mix.pan()),
            ) else {
                return;
            };
            let chain = audio
                .connect(input, volume)
                .and_then(|_| audio.connect(volume, panner));
            if let Err(e) = chain {
                tracing::warn!(track = %self.id, error = %e, "track routing failed");
                return;
            }
            self.routing = Some(Routing {
                input,
                volume,
                panner,
            });
        }
        self.route_to(audio, target);
    }

    /// Reconnect the panner output to `target`.
    pub fn route_to(&self, audio: &AudioGraphManager, target: Option<NodeId>) {
        let Some(routing) = self.routing else {
            return;
        };
        audio.with_graph(|g| g.disconnect_all(routing.panner));
        if let Some(target) = target {
            if let Err(e) = audio.connect(routing.panner, target) {
                tracing::warn!(track = %self.id, error = %e, "track output connect failed");
            }
        }
    }

    pub fn set_output(&mut self, output: Option<TrackId>) {
        self.output = output;
    }

    /// Remove every node this track owns from the graph.
    pub fn detach(&mut self, audio: &AudioGraphManager) {
        for (_, voice) in self.voices.drain() {
            if let Some(nodes) = voice.nodes {
                for node in nodes.iter() {
                    audio.remove_node(node);
                }
            }
        }
        if let Some(routing) = self.routing.take() {
            for node in [routing.input, routing.volume, routing.panner] {
                audio.remove_node(node);
            }
        }
    }

    // --- Mix ---

    pub fn set_volume(&mut self, audio: &AudioGraphManager, volume: f32) -> f32 {
        let v = self.mix.set_volume(volume);
        self.ramp_gain(audio);
        v
    }

    pub fn set_pan(&mut self, audio: &AudioGraphManager, pan: f32) -> f32 {
        let p = self.mix.set_pan(pan);
        if let Some(routing) = self.routing {
            audio.smooth_param(routing.panner, ParamKind::Pan, p);
        }
        p
    }

    /// Set the mute flag. Audibility is applied by [`update_audibility`].
    pub fn set_muted(&mut self, muted: bool) {
        self.mix.muted = muted;
    }

    /// Set the solo flag. Audibility is applied by [`update_audibility`].
    pub fn set_solo(&mut self, solo: bool) {
        self.mix.solo = solo;
    }

    pub fn set_armed(&mut self, armed: bool) {
        self.mix.armed = armed;
    }

    fn apply_audibility(&mut self, audio: &AudioGraphManager, audible: bool) {
        if self.audible != audible {
            self.audible = audible;
            self.ramp_gain(audio);
        }
    }

    fn effective_gain(&self) -> f32 {
        if self.audible {
            self.mix.volume()
        } else {
            0.0
        }
    }

    fn ramp_gain(&self, audio: &AudioGraphManager) {
        if let Some(routing) = self.routing {
            audio.smooth_param(routing.volume, ParamKind::Gain, self.effective_gain());
        }
    }

    // --- Clip instances ---

    pub fn instances(&self) -> &[ClipInstance] {
        &self.instances
    }

    pub fn instance(&self, id: InstanceId) -> Option<&ClipInstance> {
        self.instances.iter().find(|i| i.id() == id)
    }

    /// Place an instance, keeping start order. Overlaps are allowed.
    pub fn add_instance(&mut self, instance: ClipInstance) -> InstanceId {
        let id = instance.id();
        self.insert_instance(instance);
        id
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> Option<ClipInstance> {
        let idx = self.instances.iter().position(|i| i.id() == id)?;
        Some(self.instances.remove(idx))
    }

    /// Move an instance to a new start beat. Returns false for unknown ids.
    pub fn move_instance(&mut self, id: InstanceId, start_beat: f64) -> bool {
        let Some(mut instance) = self.remove_instance(id) else {
            return false;
        };
        instance.start_beat = if start_beat.is_finite() { start_beat.max(0.0) } else { 0.0 };
        self.insert_instance(instance);
        true
    }

    /// Drop every instance of `clip`, returning how many were removed.
    pub fn remove_instances_of(&mut self, clip: oc_ir::ClipId) -> usize {
        let before = self.instances.len();
        self.instances.retain(|i| i.clip != clip);
        before - self.instances.len()
    }

    fn insert_instance(&mut self, instance: ClipInstance) {
        let idx = self
            .instances
            .partition_point(|i| i.start_beat <= instance.start_beat);
        self.instances.insert(idx, instance);
    }

    // --- Voices ---

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(id)
    }

    pub fn voices(&self) -> impl Iterator<Item = (VoiceId, &Voice)> {
        self.voices.iter()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

/// Recompute audibility over the whole track set and ramp output gains.
pub fn update_audibility(tracks: &mut [Track], audio: &AudioGraphManager) {
    let any_solo = tracks.iter().any(|t| t.mix.solo);
    for track in tracks.iter_mut() {
        let audible = track.mix.is_audible(any_solo);
        track.apply_audibility(audio, audible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::host::OfflineHost;
    use oc_ir::ClipId;

    fn audio() -> AudioGraphManager {
        let mut m = AudioGraphManager::new(Box::new(OfflineHost::new(48_000)), CoreConfig::default());
        m.init().unwrap();
        m
    }

    #[test]
    fn instances_stay_sorted_through_edits() {
        let mut track = Track::new("t", TrackKind::midi());
        let clip = ClipId::new();
        let a = track.add_instance(ClipInstance::new(clip, 8.0));
        track.add_instance(ClipInstance::new(clip, 0.0));
        let c = track.add_instance(ClipInstance::new(clip, 4.0));
        track.move_instance(a, 2.0);
        track.move_instance(c, 12.0);
        assert!(!track.move_instance(InstanceId::new(), 1.0));
        let starts: Vec<f64> = track.instances().iter().map(|i| i.start_beat).collect();
        assert_eq!(starts, vec![0.0, 2.0, 12.0]);
        assert!(track.remove_instance(c).is_some());
        assert_eq!(track.remove_instances_of(clip), 2);
    }

    #[test]
    fn overlapping_instances_are_kept() {
        let mut track = Track::new("t", TrackKind::midi());
        let clip = ClipId::new();
        track.add_instance(ClipInstance::new(clip, 1.0));
        track.add_instance(ClipInstance::new(clip, 1.5));
        assert_eq!(track.instances().len(), 2);
    }

    #[test]
    fn solo_recomputes_globally() {
        let audio = audio();
        let mut tracks: Vec<Track> = (0..3).map(|i| Track::new(&format!("t{i}"), TrackKind::midi())).collect();
        tracks[1].set_solo(true);
        tracks[2].set_muted(true);
        update_audibility(&mut tracks, &audio);
        let any_solo = tracks.iter().any(|t| t.mix().solo);
        for t in &tracks {
            assert_eq!(t.is_audible(), t.mix().is_audible(any_solo));
        }
        assert!(!tracks[0].is_audible());
        assert!(tracks[1].is_audible());
        tracks[1].set_solo(false);
        update_audibility(&mut tracks, &audio);
        assert!(tracks[0].is_audible());
        assert!(!tracks[2].is_audible());
    }

    #[test]
    fn volume_and_pan_glide_to_new_values() {
        let audio = audio();
        let mut track = Track::new("t", TrackKind::midi());
        track.attach(&audio, audio.master_input());
        let routing = track.routing().unwrap();
        let at = |node: NodeId, kind: ParamKind, t: f64| audio.param(node, kind, |p| p.value_at(t)).unwrap();

        track.set_volume(&audio, 0.2);
        track.set_pan(&audio, 1.0);
        let soon = audio.now() + 0.005;
        let gain = at(routing.volume, ParamKind::Gain, soon);
        assert!(gain > 0.2 && gain < 0.8, "gain jumped to {gain}");
        let pan = at(routing.panner, ParamKind::Pan, soon);
        assert!(pan > 0.0 && pan < 1.0, "pan jumped to {pan}");

        audio.render_offline(4_800).unwrap();
        let now = audio.now();
        assert!((at(routing.volume, ParamKind::Gain, now) - 0.2).abs() < 1e-3);
        assert!((at(routing.panner, ParamKind::Pan, now) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn routing_is_built_and_torn_down() {
        let audio = audio();
        let before = audio.with_graph(|g| g.len()).unwrap();
        let mut track = Track::new("t", TrackKind::audio());
        track.attach(&audio, audio.master_input());
        assert!(track.input().is_some());
        assert_eq!(audio.with_graph(|g| g.len()), Some(before + 3));
        track.detach(&audio);
        assert_eq!(audio.with_graph(|g| g.len()), Some(before));
    }

    #[test]
    fn mix_setters_clamp_without_audio() {
        let mut m = AudioGraphManager::new(Box::new(crate::host::UnavailableHost), CoreConfig::default());
        let _ = m.init();
        let mut track = Track::new("t", TrackKind::midi());
        track.attach(&m, m.master_input());
        assert!(track.routing().is_none());
        assert_eq!(track.set_volume(&m, 2.0), 1.0);
        assert_eq!(track.set_pan(&m, -5.0), -1.0);
    }

    #[test]
    fn data_round_trip() {
        let mut track = Track::new("lead", TrackKind::midi());
        track.add_instance(ClipInstance::new(ClipId::new(), 4.0));
        track.set_armed(true);
        let back = Track::from_data(track.to_data());
        assert_eq!(back.id(), track.id());
        assert_eq!(back.instances(), track.instances());
        assert!(back.mix().armed);
    }
}
