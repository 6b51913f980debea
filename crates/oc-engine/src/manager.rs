//! Owns the audio graph and its host, and builds nodes on request.
//!
//! Every factory returns `None` when audio is unavailable so callers can
//! keep working on the timeline without sound.

use std::sync::Arc;
use std::time::Instant;

use oc_ir::{SampleData, Waveform};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::EngineError;
use crate::frame::Frame;
use crate::graph::{AudioGraph, NodeId, SharedGraph};
use crate::host::{AudioError, AudioHost};
use crate::node::{
    reverb_impulse, Analyser, BufferSource, Convolver, Delay, Filter, FilterMode, Limiter, Node,
    ParamKind, Reading,
};
use crate::param::AudioParam;

/// Signal level in decibels relative to full scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Level {
    Silent,
    Decibels(f32),
}

impl Level {
    /// Below this linear amplitude a signal counts as silent.
    const FLOOR: f32 = 1e-5;

    pub fn from_linear(amplitude: f32) -> Self {
        if amplitude.is_finite() && amplitude > Self::FLOOR {
            Level::Decibels(20.0 * amplitude.log10())
        } else {
            Level::Silent
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Silent => write!(f, "-inf dB"),
            Level::Decibels(db) => write!(f, "{:.1} dB", db),
        }
    }
}

/// limiter -> master gain -> analyser -> destination
#[derive(Clone, Copy, Debug)]
struct MasterChain {
    limiter: NodeId,
    gain: NodeId,
    analyser: NodeId,
}

pub struct AudioGraphManager {
    host: Box<dyn AudioHost>,
    config: CoreConfig,
    graph: Option<SharedGraph>,
    master: Option<MasterChain>,
    master_volume: f32,
    last_error: Option<AudioError>,
    suspended: bool,
    epoch: Instant,
}

impl AudioGraphManager {
    pub fn new(host: Box<dyn AudioHost>, config: CoreConfig) -> Self {
        let master_volume = config.master_volume.clamp(0.0, 1.0);
        Self {
            host,
            config,
            graph: None,
            master: None,
            master_volume,
            last_error: None,
            suspended: false,
            epoch: Instant::now(),
        }
    }

    /// Create the graph and master chain and start the host. Calling this
    /// again once initialized does nothing.
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.graph.is_some() {
            return Ok(());
        }
        let sample_rate = match self.host.probe() {
            Ok(rate) => rate,
            Err(e) => {
                warn!(host = self.host.name(), error = %e, "audio unavailable");
                self.last_error = Some(e.clone());
                return Err(EngineError::Unavailable(e));
            }
        };

        let mut graph = AudioGraph::new(sample_rate);
        let limiter = graph.add(Node::Limiter(Limiter::new(
            self.config.limiter_threshold,
            0.05,
            sample_rate,
        )));
        let gain = graph.add(Node::gain(self.master_volume));
        let analyser = graph.add(Node::Analyser(Analyser::new(sample_rate)));
        graph.connect(limiter, gain)?;
        graph.connect(gain, analyser)?;
        graph.connect(analyser, graph.destination())?;

        let shared = Arc::new(Mutex::new(graph));
        if let Err(e) = self.host.start(Arc::clone(&shared)) {
            warn!(host = self.host.name(), error = %e, "audio host failed to start");
            self.last_error = Some(e.clone());
            return Err(EngineError::Unavailable(e));
        }

        info!(host = self.host.name(), sample_rate, "audio initialized");
        self.graph = Some(shared);
        self.master = Some(MasterChain {
            limiter,
            gain,
            analyser,
        });
        self.last_error = None;
        self.suspended = false;
        Ok(())
    }

    /// Stop the host and drop the graph.
    pub fn teardown(&mut self) {
        if self.graph.take().is_some() {
            self.host.stop();
            self.master = None;
            debug!(host = self.host.name(), "audio torn down");
        }
    }

    pub fn is_available(&self) -> bool {
        self.graph.is_some()
    }

    pub fn is_realtime(&self) -> bool {
        self.host.is_realtime()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn host_name(&self) -> &str {
        self.host.name()
    }

    /// Why the last [`init`](Self::init) failed, if it did.
    pub fn last_error(&self) -> Option<&AudioError> {
        self.last_error.as_ref()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.with_graph(|g| g.sample_rate())
    }

    pub fn suspend(&mut self) -> Result<(), EngineError> {
        if self.graph.is_none() {
            return Err(EngineError::NotInitialized);
        }
        self.host.suspend().map_err(EngineError::Unavailable)?;
        self.suspended = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.graph.is_none() {
            return Err(EngineError::NotInitialized);
        }
        self.host.resume().map_err(EngineError::Unavailable)?;
        self.suspended = false;
        Ok(())
    }

    /// Current time in seconds: the audio clock, or wall time since the
    /// manager was created when there is no graph.
    pub fn now(&self) -> f64 {
        match &self.graph {
            Some(graph) => graph.lock().current_time(),
            None => self.epoch.elapsed().as_secs_f64(),
        }
    }

    /// Run `f` with the graph locked.
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut AudioGraph) -> R) -> Option<R> {
        self.graph.as_ref().map(|g| f(&mut g.lock()))
    }

    /// Node that track outputs connect into.
    pub fn master_input(&self) -> Option<NodeId> {
        self.master.map(|m| m.limiter)
    }

    pub fn add_node(&self, node: Node) -> Option<NodeId> {
        self.with_graph(|g| g.add(node))
    }

    pub fn create_oscillator(&self, waveform: Waveform, frequency: f32) -> Option<NodeId> {
        self.add_node(Node::oscillator(waveform, frequency))
    }

    pub fn create_gain(&self, gain: f32) -> Option<NodeId> {
        self.add_node(Node::gain(gain))
    }

    pub fn create_filter(&self, mode: FilterMode, cutoff: f32, resonance: f32) -> Option<NodeId> {
        self.add_node(Node::Filter(Filter::new(mode, cutoff, resonance)))
    }

    pub fn create_delay(&self, max_seconds: f64, time: f64, feedback: f32) -> Option<NodeId> {
        let rate = self.sample_rate()?;
        self.add_node(Node::Delay(Delay::new(max_seconds, time, feedback, rate)))
    }

    /// Convolver loaded with a generated reverb impulse.
    pub fn create_reverb(&self, seconds: f64, decay: f64) -> Option<NodeId> {
        let rate = self.sample_rate()?;
        let taps = reverb_impulse(rate, seconds, decay, fastrand::u64(..));
        self.add_node(Node::Convolver(Convolver::new(taps)))
    }

    pub fn create_panner(&self, pan: f32) -> Option<NodeId> {
        self.add_node(Node::panner(pan))
    }

    pub fn create_analyser(&self) -> Option<NodeId> {
        let rate = self.sample_rate()?;
        self.add_node(Node::Analyser(Analyser::new(rate)))
    }

    pub fn create_buffer_source(&self, data: Arc<SampleData>) -> Option<NodeId> {
        self.add_node(Node::BufferSource(BufferSource::new(data)))
    }

    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<(), EngineError> {
        self.with_graph(|g| g.connect(from, to))
            .ok_or(EngineError::NotInitialized)?
            .map_err(EngineError::from)
    }

    pub fn disconnect(&self, from: NodeId, to: NodeId) {
        self.with_graph(|g| g.disconnect(from, to));
    }

    pub fn remove_node(&self, id: NodeId) {
        self.with_graph(|g| g.remove(id));
    }

    /// Edit one parameter of a node.
    pub fn param<R>(
        &self,
        id: NodeId,
        kind: ParamKind,
        f: impl FnOnce(&mut AudioParam) -> R,
    ) -> Option<R> {
        self.with_graph(|g| g.param_mut(id, kind).map(f)).flatten()
    }

    /// Glide a parameter to `value` from now without clicks.
    pub fn smooth_param(&self, id: NodeId, kind: ParamKind, value: f32) {
        let tc = self.config.smoothing;
        self.with_graph(|g| {
            let now = g.current_time();
            if let Some(param) = g.param_mut(id, kind) {
                param.cancel_and_hold(now);
                param.set_target_at(value, now, tc);
            }
        });
    }

    /// Set master volume in `[0, 1]`, smoothed.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        if let Some(master) = self.master {
            self.smooth_param(master.gain, ParamKind::Gain, self.master_volume);
        }
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn master_reading(&self) -> Option<Reading> {
        let analyser = self.master?.analyser;
        self.with_graph(|g| g.node(analyser).and_then(Node::reading)).flatten()
    }

    /// Peak output level at the end of the master chain.
    pub fn master_level(&self) -> Level {
        self.master_reading()
            .map_or(Level::Silent, |r| Level::from_linear(r.peak))
    }

    /// Collapse automation that is already in the past.
    pub fn prune(&self) {
        self.with_graph(|g| {
            let now = g.current_time();
            g.prune_automation(now);
        });
    }

    /// Render `frames` frames synchronously. Only hosts that do not pull
    /// frames themselves allow this.
    pub fn render_offline(&self, frames: usize) -> Result<Vec<Frame>, EngineError> {
        if self.host.is_realtime() {
            return Err(EngineError::RealtimeHost);
        }
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;
        let mut out = vec![Frame::silence(); frames];
        graph.lock().render(&mut out);
        Ok(out)
    }
}

impl Drop for AudioGraphManager {
    fn drop(&mut self) {
        self.teardown();
    }
}
