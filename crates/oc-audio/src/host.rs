//! `AudioHost` over the default cpal output device.

use oc_engine::{AudioError, AudioHost, Frame, SharedGraph};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cpal_backend::{default_output, CpalOutput};

/// Frames rendered per graph lock.
const BLOCK_FRAMES: usize = 256;

/// Renders the shared graph on a dedicated thread and feeds the device
/// through a ring buffer.
#[derive(Default)]
pub struct CpalHost {
    sample_rate: Option<u32>,
    alive: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioHost for CpalHost {
    fn name(&self) -> &str {
        "cpal"
    }

    fn probe(&mut self) -> Result<u32, AudioError> {
        let (_, config) = default_output()?;
        let rate = config.sample_rate.0;
        self.sample_rate = Some(rate);
        Ok(rate)
    }

    fn start(&mut self, graph: SharedGraph) -> Result<(), AudioError> {
        self.stop();
        self.alive = Arc::new(AtomicBool::new(true));
        self.paused.store(false, Ordering::Relaxed);

        let (ready_tx, ready_rx) = mpsc::channel();
        let alive = Arc::clone(&self.alive);
        let paused = Arc::clone(&self.paused);
        let expected = self.sample_rate;
        let thread = std::thread::Builder::new()
            .name("oc-render".into())
            .spawn(move || render_thread(graph, alive, paused, expected, ready_tx))
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                info!(sample_rate = rate, "cpal stream running");
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::Playback("render thread exited".into()))
            }
        }
    }

    fn suspend(&mut self) -> Result<(), AudioError> {
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), AudioError> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            debug!("cpal render thread joined");
        }
    }

    fn is_realtime(&self) -> bool {
        true
    }
}

impl Drop for CpalHost {
    fn drop(&mut self) {
        self.stop();
    }
}

// The cpal stream is not Send on every platform, so it is created and
// dropped on this thread.
fn render_thread(
    graph: SharedGraph,
    alive: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    expected_rate: Option<u32>,
    ready: mpsc::Sender<Result<u32, AudioError>>,
) {
    let mut output = match CpalOutput::open() {
        Ok(output) => output,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let rate = output.sample_rate();
    if expected_rate.is_some_and(|r| r != rate) {
        warn!(expected = ?expected_rate, actual = rate, "device sample rate changed since probe");
    }
    let _ = ready.send(Ok(rate));

    let mut block = vec![Frame::silence(); BLOCK_FRAMES];
    let mut was_paused = false;
    while alive.load(Ordering::Relaxed) {
        let pause = paused.load(Ordering::Relaxed);
        if pause != was_paused {
            if let Err(e) = output.set_paused(pause) {
                warn!(error = %e, "stream pause toggle failed");
            }
            was_paused = pause;
        }
        if pause {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        graph.lock().render(&mut block);
        if !output.push_block(&block, &alive) {
            break;
        }
    }

    // Let the device drain quietly before the stream drops.
    block.fill(Frame::silence());
    output.push_block(&block, &AtomicBool::new(false));
}
