//! Playback engine for octavo.
//!
//! Owns the audio graph, turns clip placements into scheduled voices and
//! runs the transport clock that drives them.

mod config;
mod envelope;
mod error;
mod event_queue;
mod frame;
mod frequency;
pub mod graph;
mod host;
mod manager;
mod metronome;
pub mod node;
mod param;
pub mod scheduler;
mod track;
mod transport;
mod voice;

pub use config::{CoreConfig, EngineConfig, MetronomeConfig, VoiceConfig};
pub use envelope::{schedule_contour, schedule_release, Contour};
pub use error::EngineError;
pub use event_queue::{Action, EventQueue, Scheduled};
pub use frame::Frame;
pub use frequency::midi_to_hz;
pub use graph::{AudioGraph, GraphError, NodeId, SharedGraph};
pub use host::{AudioError, AudioHost, OfflineHost, UnavailableHost};
pub use manager::{AudioGraphManager, Level};
pub use metronome::{Metronome, CLICK_LENGTH};
pub use node::{FilterMode, Node, ParamKind, Reading};
pub use param::AudioParam;
pub use scheduler::{ReleaseMode, VoiceScheduler, Window};
pub use track::{update_audibility, Routing, Track};
pub use transport::{Session, TickReport, Transport};
pub use voice::{Voice, VoiceId, VoiceNodes, VoiceSource, VoiceState};
