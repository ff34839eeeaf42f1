//! Capture side of the core: hardware frames → ring buffer → gated slices.
//!
//! # Pipeline
//!
//! ```text
//! AudioDevice callback ──▶ Recorder::on_frame ──▶ RingBuffer<u8> (mutex)
//!        │                        │
//!        │                        └─▶ Event::MicData (every enabled frame)
//!        ▼
//! VoiceDetector::feed (Auto mode)
//!
//! capture-slice thread: poll_slices() ──▶ SliceCallback(slice_size bytes)
//! ```
//!
//! The mode engine never talks to [`Recorder`] directly; it holds a
//! [`CaptureControl`] so the gating calls can be observed in tests.

pub mod buffer;
pub mod device;
pub mod recorder;
pub mod resample;
pub mod vad;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use buffer::RingBuffer;
pub use device::{AudioDevice, AudioFrame, CpalDevice, DeviceHandle, FrameCallback};
pub use recorder::{Recorder, SliceCallback};
pub use resample::{f32_to_pcm16, pcm16_to_f32, resample_linear, stereo_to_mono};
pub use vad::{EnergyVad, VadStatus, VoiceDetector};

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// PCM layout of the frames delivered by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes of PCM per millisecond.
    ///
    /// ```
    /// use voice_chat_core::audio::AudioFormat;
    ///
    /// let fmt = AudioFormat { sample_rate: 16_000, bit_depth: 16, channels: 1 };
    /// assert_eq!(fmt.bytes_per_ms(), 32);
    /// ```
    pub fn bytes_per_ms(&self) -> usize {
        self.sample_rate as usize * self.bit_depth as usize * self.channels as usize / 8 / 1000
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            bit_depth: 16,
            channels: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// VAD mode / flag
// ---------------------------------------------------------------------------

/// Who decides when speech is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadMode {
    /// The mode logic opens and closes the gate through `wakeup_set`.
    #[default]
    Manual,
    /// A voice detector opens and closes the gate.
    Auto,
}

/// Whether buffered audio is currently flowing out as slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadFlag {
    Start,
    Stop,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised by the capture pipeline and its device/detector seams.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Carries the requested device name, or `"default"`.
    #[error("input device not found: {0}")]
    NoDevice(String),

    #[error("invalid capture parameter: {0}")]
    InvalidParameter(String),

    #[error("could not allocate {0} byte capture buffer")]
    ResourceExhausted(usize),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("voice detector error: {0}")]
    Detector(String),

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("capture thread did not stop within {0:?}")]
    ShutdownTimeout(std::time::Duration),
}

// ---------------------------------------------------------------------------
// CaptureControl
// ---------------------------------------------------------------------------

/// The subset of the capture pipeline the mode logic drives.
pub trait CaptureControl: Send + Sync {
    fn start(&self) -> Result<(), CaptureError>;
    fn stop(&self) -> Result<(), CaptureError>;
    /// Drop buffered audio and resynchronise the detector.
    fn reset(&self);
    /// Arm (`true`) or disarm the wake gate.
    fn wakeup_set(&self, woken: bool);
    fn wakeup_mode_set(&self, mode: VadMode) -> Result<(), CaptureError>;
    fn vad_mode(&self) -> VadMode;
}

#[cfg(test)]
pub(crate) mod tests {
    //! Capture doubles shared by the recorder and engine tests.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// A device whose frames are pushed by the test.
    #[derive(Default)]
    pub(crate) struct ScriptedDevice {
        pub callback: Mutex<Option<FrameCallback>>,
        pub fail_open: bool,
    }

    struct NullHandle;
    impl DeviceHandle for NullHandle {}

    impl ScriptedDevice {
        pub fn push(&self, data: &[u8]) {
            let cb = self.callback.lock().unwrap().clone();
            if let Some(cb) = cb {
                cb(AudioFrame {
                    format: AudioFormat::default(),
                    data,
                });
            }
        }
    }

    impl AudioDevice for ScriptedDevice {
        fn info(&self) -> AudioFormat {
            AudioFormat::default()
        }

        fn open(&self, on_frame: FrameCallback) -> Result<Box<dyn DeviceHandle>, CaptureError> {
            if self.fail_open {
                return Err(CaptureError::NoDevice("scripted".into()));
            }
            *self.callback.lock().unwrap() = Some(on_frame);
            Ok(Box::new(NullHandle))
        }
    }

    /// A detector that reports whatever `speech` holds.
    pub(crate) struct ScriptedVad {
        pub speech: AtomicBool,
        pub starts: Mutex<u32>,
        pub fed: Mutex<usize>,
    }

    impl ScriptedVad {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                speech: AtomicBool::new(false),
                starts: Mutex::new(0),
                fed: Mutex::new(0),
            })
        }

        pub fn set_speech(&self, speech: bool) {
            self.speech.store(speech, Ordering::SeqCst);
        }
    }

    impl VoiceDetector for ScriptedVad {
        fn start(&self) -> Result<(), CaptureError> {
            *self.starts.lock().unwrap() += 1;
            Ok(())
        }
        fn stop(&self) {}
        fn status(&self) -> VadStatus {
            if self.speech.load(Ordering::SeqCst) {
                VadStatus::Speech
            } else {
                VadStatus::Silence
            }
        }
        fn feed(&self, frame: &[u8]) {
            *self.fed.lock().unwrap() += frame.len();
        }
    }
}
