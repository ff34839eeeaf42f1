//! Capture device seam and its `cpal` implementation.
//!
//! [`AudioDevice::open`] registers a per-frame callback and returns a
//! [`DeviceHandle`]; dropping the handle closes the device.
//!
//! [`CpalDevice`] keeps the `cpal::Stream` on a dedicated thread because the
//! stream is not `Send` on every platform.  The thread builds the stream,
//! reports success or failure back to `open`, then parks until the handle
//! is dropped.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{f32_to_pcm16, resample_linear, stereo_to_mono, AudioFormat, CaptureError};
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// Frame callback
// ---------------------------------------------------------------------------

/// One block of PCM as delivered by the device.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub format: AudioFormat,
    pub data: &'a [u8],
}

/// Called on the device's own thread for every frame.  Must not block.
pub type FrameCallback = Arc<dyn Fn(AudioFrame<'_>) + Send + Sync>;

/// Keeps an opened device running.  Dropping it closes the device.
pub trait DeviceHandle: Send {}

/// A source of capture frames.
pub trait AudioDevice: Send + Sync {
    /// Format of the frames passed to the callback.
    fn info(&self) -> AudioFormat;
    fn open(&self, on_frame: FrameCallback) -> Result<Box<dyn DeviceHandle>, CaptureError>;
}

// ---------------------------------------------------------------------------
// CpalDevice
// ---------------------------------------------------------------------------

/// Microphone input through `cpal`, converted to mono PCM16 at the
/// configured rate.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_chat_core::audio::{AudioDevice, AudioFrame, CpalDevice};
/// use voice_chat_core::config::AudioConfig;
///
/// let device = CpalDevice::new(&AudioConfig::default()).unwrap();
/// let _handle = device
///     .open(Arc::new(|frame: AudioFrame<'_>| println!("{} bytes", frame.data.len())))
///     .unwrap();
/// // dropping `_handle` closes the stream
/// ```
pub struct CpalDevice {
    device_name: Option<String>,
    format: AudioFormat,
}

impl CpalDevice {
    /// Look up the configured input device.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when the device is missing,
    /// [`CaptureError::NotSupported`] for a bit depth other than 16.
    pub fn new(config: &AudioConfig) -> Result<Self, CaptureError> {
        if config.bit_depth != 16 {
            return Err(CaptureError::NotSupported("cpal capture only produces 16-bit PCM"));
        }
        let device = find_input(config.input_device.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "<unknown>".into());
        log::info!("capture device: {name}");

        Ok(Self {
            device_name: config.input_device.clone(),
            format: AudioFormat {
                sample_rate: config.sample_rate,
                bit_depth: 16,
                channels: 1,
            },
        })
    }
}

impl AudioDevice for CpalDevice {
    fn info(&self) -> AudioFormat {
        self.format
    }

    fn open(&self, on_frame: FrameCallback) -> Result<Box<dyn DeviceHandle>, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let format = self.format;

        let thread = std::thread::Builder::new()
            .name("capture-device".into())
            .spawn(move || {
                let stream = match build_stream(device_name.as_deref(), format, on_frame) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until the handle drops its sender.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("capture device: stream closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalHandle {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Device("capture thread exited during setup".into()))
            }
        }
    }
}

struct CpalHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceHandle for CpalHandle {}

impl Drop for CpalHandle {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn find_input(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::NoDevice(name.to_string())),
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::NoDevice("default".into())),
    }
}

fn build_stream(
    name: Option<&str>,
    format: AudioFormat,
    on_frame: FrameCallback,
) -> Result<cpal::Stream, CaptureError> {
    let device = find_input(name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::Device(format!("failed to query input config: {e}")))?;

    let native_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let config: cpal::StreamConfig = supported.into();
    log::info!(
        "capture device: native {native_rate} Hz x{channels}, delivering {} Hz mono",
        format.sample_rate
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono = stereo_to_mono(data, channels);
                let resampled = resample_linear(&mono, native_rate, format.sample_rate);
                let pcm = f32_to_pcm16(&resampled);
                on_frame(AudioFrame { format, data: &pcm });
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )
        .map_err(|e| CaptureError::Device(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| CaptureError::Device(format!("failed to start input stream: {e}")))?;
    Ok(stream)
}
