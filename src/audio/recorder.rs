//! VAD capture pipeline: device frames in, fixed-size slices out.
//!
//! # Gating
//!
//! ```text
//!                 enabled?──no──▶ drop
//!                    │yes
//!         ┌──────────┴──────────┐
//!       Manual                 Auto
//!  buffer while flag=Start   feed detector, always buffer
//!                            (drop oldest frame_len bytes on overflow)
//!         └──────────┬──────────┘
//!                    ▼
//!         Event::MicData (queued)
//!
//! capture-slice thread, every cycle:
//!   deliver queued bus events
//!   Auto: poll detector, on edge update flag (+ VadChange if woken)
//!   while flag=Start && buffered >= slice_size: emit one slice
//! ```
//!
//! The ring buffer mutex is held for one buffer operation at a time and
//! never across the slice callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{
    AudioDevice, AudioFormat, AudioFrame, CaptureControl, CaptureError, DeviceHandle, RingBuffer,
    VadFlag, VadMode, VadStatus, VoiceDetector,
};
use crate::config::VadConfig;
use crate::event::{Event, EventBus};

/// Extra buffer headroom on top of `active_ms` for burst jitter.
const CAPACITY_MARGIN_MS: u32 = 300;
/// How long the slice task sleeps when a cycle emitted nothing.
const IDLE_SLEEP: Duration = Duration::from_millis(10);
/// Bounded join on stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Receives every emitted slice, on the capture-slice thread.
pub type SliceCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared {
    enabled: AtomicBool,
    woken: AtomicBool,
    auto: AtomicBool,
    /// `vad_flag == Start`.
    speaking: AtomicBool,
    ring: Mutex<RingBuffer<u8>>,
    slice_size: usize,
    capacity_size: usize,
    detector: Option<Arc<dyn VoiceDetector>>,
    bus: Arc<EventBus>,
    output: SliceCallback,
}

impl Shared {
    fn lock_ring(&self) -> MutexGuard<'_, RingBuffer<u8>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn vad_mode(&self) -> VadMode {
        if self.auto.load(Ordering::Acquire) {
            VadMode::Auto
        } else {
            VadMode::Manual
        }
    }

    /// Device callback body.  Must not block beyond one ring operation.
    fn on_frame(&self, data: &[u8]) {
        if !self.enabled.load(Ordering::Acquire) || data.is_empty() {
            return;
        }

        if self.auto.load(Ordering::Acquire) {
            if let Some(detector) = &self.detector {
                detector.feed(data);
            }
            let mut ring = self.lock_ring();
            let max = ring.max_len();
            let frame = if data.len() > max {
                &data[data.len() - max..]
            } else {
                data
            };
            if ring.len() + frame.len() > max {
                let dropped = ring.discard(frame.len());
                log::trace!("recorder: overflow, dropped {dropped} oldest bytes");
            }
            ring.write(frame);
        } else if self.speaking.load(Ordering::Acquire) {
            let written = self.lock_ring().write(data);
            if written < data.len() {
                log::trace!("recorder: buffer full, dropped {} bytes", data.len() - written);
            }
        }

        // delivered from the slice task, never on the device thread
        self.bus.post(Event::MicData(data.to_vec()));
    }

    fn poll_detector(&self) {
        if !self.auto.load(Ordering::Acquire) || !self.enabled.load(Ordering::Acquire) {
            return;
        }
        let Some(detector) = &self.detector else {
            return;
        };
        let speaking = detector.status() == VadStatus::Speech;
        if self.speaking.swap(speaking, Ordering::AcqRel) != speaking {
            let flag = if speaking { VadFlag::Start } else { VadFlag::Stop };
            log::debug!("recorder: detector edge {flag:?}");
            if self.woken.load(Ordering::Acquire) {
                self.bus.publish(Event::VadChange(flag));
            }
        }
    }

    fn poll_slices(&self) -> usize {
        self.bus.flush();
        self.poll_detector();

        let mut emitted = 0;
        while self.speaking.load(Ordering::Acquire) {
            let slice = {
                let mut ring = self.lock_ring();
                if ring.len() < self.slice_size {
                    break;
                }
                ring.read_exact(self.slice_size)
            };
            match slice {
                Some(slice) => {
                    (self.output)(&slice);
                    emitted += 1;
                }
                None => break,
            }
        }
        emitted
    }
}

// ---------------------------------------------------------------------------
// Slice task
// ---------------------------------------------------------------------------

struct SliceTask {
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl SliceTask {
    fn spawn(shared: Arc<Shared>) -> Result<Self, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("capture-slice".into())
            .spawn(move || {
                log::debug!("recorder: slice task started");
                while !flag.load(Ordering::Acquire) {
                    if shared.poll_slices() == 0 {
                        thread::sleep(IDLE_SLEEP);
                    }
                }
                log::debug!("recorder: slice task exiting");
                let _ = done_tx.send(());
            })?;

        Ok(Self { stop, done, thread })
    }

    fn shutdown(self, timeout: Duration) -> Result<(), CaptureError> {
        self.stop.store(true, Ordering::Release);
        // stop() can arrive from a subscriber running on the task itself
        if self.thread.thread().id() == thread::current().id() {
            return Ok(());
        }
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("recorder: slice task did not stop within {timeout:?}, detaching");
                Err(CaptureError::ShutdownTimeout(timeout))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// The capture pipeline.
///
/// Created stopped: frames are dropped until [`start`](CaptureControl::start).
pub struct Recorder {
    shared: Arc<Shared>,
    format: AudioFormat,
    device: Mutex<Option<Box<dyn DeviceHandle>>>,
    task: Mutex<Option<SliceTask>>,
}

impl Recorder {
    /// Size the buffer, open `device` and start the slice task.
    ///
    /// All-or-nothing: on error nothing stays open or running.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::InvalidParameter`] for a zero slice, an unusable
    ///   device format, or a slice larger than the buffer.
    /// - [`CaptureError::NotSupported`] for Auto mode without a detector.
    /// - [`CaptureError::ResourceExhausted`] if the buffer cannot be allocated.
    /// - Any error from opening the device or spawning the task.
    pub fn init(
        config: &VadConfig,
        device: &dyn AudioDevice,
        detector: Option<Arc<dyn VoiceDetector>>,
        bus: Arc<EventBus>,
        output: SliceCallback,
    ) -> Result<Self, CaptureError> {
        Self::build(config, device, detector, bus, output, true)
    }

    fn build(
        config: &VadConfig,
        device: &dyn AudioDevice,
        detector: Option<Arc<dyn VoiceDetector>>,
        bus: Arc<EventBus>,
        output: SliceCallback,
        spawn_task: bool,
    ) -> Result<Self, CaptureError> {
        let format = device.info();
        let bytes_per_ms = format.bytes_per_ms();
        if bytes_per_ms == 0 {
            return Err(CaptureError::InvalidParameter(format!(
                "device format {format:?} yields zero bytes per ms"
            )));
        }
        if config.slice_ms == 0 {
            return Err(CaptureError::InvalidParameter("slice_ms must be > 0".into()));
        }
        if config.mode == VadMode::Auto && detector.is_none() {
            return Err(CaptureError::NotSupported("auto VAD mode needs a voice detector"));
        }

        let slice_size = config.slice_ms as usize * bytes_per_ms;
        let capacity_size =
            (config.active_ms + CAPACITY_MARGIN_MS) as usize * bytes_per_ms + 1;
        if slice_size > capacity_size - 1 {
            return Err(CaptureError::InvalidParameter(format!(
                "slice of {slice_size} bytes does not fit a {capacity_size} byte buffer"
            )));
        }
        let ring = RingBuffer::try_new(capacity_size)
            .ok_or(CaptureError::ResourceExhausted(capacity_size))?;

        let shared = Arc::new(Shared {
            enabled: AtomicBool::new(false),
            woken: AtomicBool::new(false),
            auto: AtomicBool::new(config.mode == VadMode::Auto),
            speaking: AtomicBool::new(false),
            ring: Mutex::new(ring),
            slice_size,
            capacity_size,
            detector,
            bus,
            output,
        });

        let on_frame = Arc::clone(&shared);
        let handle =
            device.open(Arc::new(move |frame: AudioFrame<'_>| on_frame.on_frame(frame.data)))?;

        // Dropping `handle` on the error path closes the device again.
        let task = if spawn_task {
            Some(SliceTask::spawn(Arc::clone(&shared))?)
        } else {
            None
        };

        log::info!(
            "recorder: {:?} mode, slice {slice_size} B, buffer {capacity_size} B",
            config.mode
        );

        Ok(Self {
            shared,
            format,
            device: Mutex::new(Some(handle)),
            task: Mutex::new(task),
        })
    }

    /// Deliver queued `MicData` and emit every complete slice currently
    /// buffered.  Returns the number of slices emitted.  The slice task
    /// calls this each cycle.
    pub fn poll_slices(&self) -> usize {
        self.shared.poll_slices()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn slice_size(&self) -> usize {
        self.shared.slice_size
    }

    pub fn capacity_size(&self) -> usize {
        self.shared.capacity_size
    }

    /// Bytes currently held in the ring buffer.
    pub fn buffered(&self) -> usize {
        self.shared.lock_ring().len()
    }

    pub fn vad_flag(&self) -> VadFlag {
        if self.shared.speaking.load(Ordering::Acquire) {
            VadFlag::Start
        } else {
            VadFlag::Stop
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    pub fn is_woken(&self) -> bool {
        self.shared.woken.load(Ordering::Acquire)
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<SliceTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restart_detector(&self) {
        if let Some(detector) = &self.shared.detector {
            detector.stop();
            if let Err(e) = detector.start() {
                log::warn!("recorder: detector restart failed: {e}");
            }
        }
    }
}

impl CaptureControl for Recorder {
    fn start(&self) -> Result<(), CaptureError> {
        if self.shared.vad_mode() == VadMode::Auto {
            if let Some(detector) = &self.shared.detector {
                detector.start()?;
            }
        }

        let mut task = self.lock_task();
        if task.is_none() {
            *task = Some(SliceTask::spawn(Arc::clone(&self.shared))?);
        }
        drop(task);

        self.shared.enabled.store(true, Ordering::Release);
        log::debug!("recorder: started");
        Ok(())
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.shared.enabled.store(false, Ordering::Release);
        if self.shared.vad_mode() == VadMode::Auto {
            if let Some(detector) = &self.shared.detector {
                detector.stop();
            }
        }

        let task = self.lock_task().take();
        log::debug!("recorder: stopped");
        match task {
            Some(task) => task.shutdown(SHUTDOWN_TIMEOUT),
            None => Ok(()),
        }
    }

    fn reset(&self) {
        self.shared.lock_ring().clear();
        if self.shared.vad_mode() == VadMode::Auto {
            self.restart_detector();
        }
        log::debug!("recorder: reset");
    }

    fn wakeup_set(&self, woken: bool) {
        self.shared.woken.store(woken, Ordering::Release);
        if self.shared.vad_mode() == VadMode::Auto {
            return;
        }
        if self.shared.speaking.swap(woken, Ordering::AcqRel) != woken {
            let flag = if woken { VadFlag::Start } else { VadFlag::Stop };
            log::debug!("recorder: wake gate {flag:?}");
            self.shared.bus.publish(Event::VadChange(flag));
        }
    }

    fn wakeup_mode_set(&self, mode: VadMode) -> Result<(), CaptureError> {
        if mode == self.shared.vad_mode() {
            return Ok(());
        }
        if mode == VadMode::Auto && self.shared.detector.is_none() {
            return Err(CaptureError::NotSupported("auto VAD mode needs a voice detector"));
        }

        let was_running = self.is_enabled();
        self.stop()?;
        self.shared
            .auto
            .store(mode == VadMode::Auto, Ordering::Release);
        let speaking = mode == VadMode::Manual && self.is_woken();
        self.shared.speaking.store(speaking, Ordering::Release);
        log::info!("recorder: vad mode -> {mode:?}");

        if was_running {
            self.start()?;
        }
        Ok(())
    }

    fn vad_mode(&self) -> VadMode {
        self.shared.vad_mode()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shared.enabled.store(false, Ordering::Release);
        if let Some(task) = self.lock_task().take() {
            let _ = task.shutdown(SHUTDOWN_TIMEOUT);
        }
        drop(
            self.device
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
