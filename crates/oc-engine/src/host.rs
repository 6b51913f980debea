//! Audio host trait and error types.
//!
//! A host owns the device side of playback: it reports the sample rate the
//! graph should run at and, once started, pulls frames from the shared graph
//! at its own pace.

use crate::graph::SharedGraph;

/// Error type for audio operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
    /// No audio device available
    NoDevice,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceInit(msg) => write!(f, "Device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "Stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback error: {}", msg),
            AudioError::NoDevice => write!(f, "No audio device available"),
        }
    }
}

impl std::error::Error for AudioError {}

/// A backend that drives an [`AudioGraph`](crate::AudioGraph).
pub trait AudioHost: Send {
    fn name(&self) -> &str;

    /// Check the device and return the sample rate to render at.
    fn probe(&mut self) -> Result<u32, AudioError>;

    /// Begin pulling frames from `graph`.
    fn start(&mut self, graph: SharedGraph) -> Result<(), AudioError>;

    /// Pause output without dropping the stream.
    fn suspend(&mut self) -> Result<(), AudioError>;

    fn resume(&mut self) -> Result<(), AudioError>;

    /// Stop output and release the device.
    fn stop(&mut self);

    /// Whether the host renders in real time. Offline rendering is only
    /// allowed on hosts that do not.
    fn is_realtime(&self) -> bool;
}

/// A host without a device. Frames are rendered on demand.
#[derive(Debug, Clone)]
pub struct OfflineHost {
    sample_rate: u32,
}

impl OfflineHost {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }
}

impl AudioHost for OfflineHost {
    fn name(&self) -> &str {
        "offline"
    }

    fn probe(&mut self) -> Result<u32, AudioError> {
        Ok(self.sample_rate)
    }

    fn start(&mut self, _graph: SharedGraph) -> Result<(), AudioError> {
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_realtime(&self) -> bool {
        false
    }
}

/// A host that never has a device, for headless environments.
#[derive(Debug, Clone, Default)]
pub struct UnavailableHost;

impl AudioHost for UnavailableHost {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn probe(&mut self) -> Result<u32, AudioError> {
        Err(AudioError::NoDevice)
    }

    fn start(&mut self, _graph: SharedGraph) -> Result<(), AudioError> {
        Err(AudioError::NoDevice)
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_realtime(&self) -> bool {
        true
    }
}
