//! Default-device cpal stream fed from a frame ring buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use oc_engine::{AudioError, Frame};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Seconds of audio the ring buffer holds.
const BUFFER_SECONDS: f64 = 0.1;

/// Default output device with a stereo stream config.
pub(crate) fn default_output() -> Result<(Device, StreamConfig), AudioError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::NoDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
    let mut config: StreamConfig = supported.into();
    config.channels = 2;
    Ok((device, config))
}

/// Fill one device buffer. Channels past the first two get silence, and
/// so does everything once the ring runs dry.
fn fill_device_buffer(data: &mut [f32], channels: usize, ring: &mut HeapCons<Frame>) {
    for slot in data.chunks_mut(channels) {
        let (left, right) = ring.try_pop().unwrap_or_default().to_f32();
        slot.fill(0.0);
        if let Some(l) = slot.first_mut() {
            *l = left;
        }
        if let Some(r) = slot.get_mut(1) {
            *r = right;
        }
    }
}

pub(crate) struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    ring: HeapProd<Frame>,
    /// The callback outputs silence while this is false
    audible: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default device and start its stream.
    pub(crate) fn open() -> Result<Self, AudioError> {
        let (device, config) = default_output()?;
        let capacity = ((config.sample_rate.0 as f64 * BUFFER_SECONDS) as usize).max(256);
        let (ring, consumer) = HeapRb::<Frame>::new(capacity).split();
        let mut output = Self {
            device,
            config,
            stream: None,
            ring,
            audible: Arc::new(AtomicBool::new(false)),
        };
        output.start_stream(consumer)?;
        Ok(output)
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let audible = Arc::clone(&self.audible);
        let channels = self.config.channels as usize;
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if audible.load(Ordering::Relaxed) {
                        fill_device_buffer(data, channels, &mut consumer);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| tracing::warn!(error = %err, "audio stream error"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;
        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        self.audible.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Push a rendered block, yielding while the ring is full. Gives up and
    /// returns false as soon as `alive` clears.
    pub(crate) fn push_block(&mut self, block: &[Frame], alive: &AtomicBool) -> bool {
        let mut rest = block;
        while !rest.is_empty() {
            let pushed = self.ring.push_slice(rest);
            rest = &rest[pushed..];
            if pushed == 0 {
                if !alive.load(Ordering::Relaxed) {
                    return false;
                }
                std::thread::yield_now();
            }
        }
        true
    }

    pub(crate) fn set_paused(&mut self, paused: bool) -> Result<(), AudioError> {
        self.audible.store(!paused, Ordering::Relaxed);
        let Some(stream) = &self.stream else {
            return Ok(());
        };
        let toggled = if paused {
            stream.pause().map_err(|e| e.to_string())
        } else {
            stream.play().map_err(|e| e.to_string())
        };
        toggled.map_err(AudioError::Playback)
    }
}
