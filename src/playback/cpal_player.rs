//! Speaker output through `cpal`.
//!
//! [`CpalPlayer`] decodes WAV (with `hound`) and raw PCM16 sources into a
//! sample queue that the output callback drains.  Pushed TTS streams must be
//! PCM16; any other codec is refused with [`PlaybackError::NotSupported`].
//!
//! Like the capture device, the `cpal::Stream` lives on its own thread.  The
//! thread also reports the end of a track: the audio callback only marks it,
//! so listeners never run on the real-time thread.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::{AudioSource, Codec, PlaybackError, Player, PlayerEvent, PlayerListener, PlayerState};
use crate::audio::{pcm16_to_f32, resample_linear, stereo_to_mono};
use crate::config::AudioConfig;

/// How often the output thread checks for a finished track.
const END_POLL: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Shared output state
// ---------------------------------------------------------------------------

struct Output {
    /// Mono samples at the device rate.
    queue: VecDeque<f32>,
    state: PlayerState,
    volume: u8,
    /// A pushed stream that has not been finished yet.
    streaming: bool,
    /// Set by the callback when a track ran out, cleared when reported.
    ended: bool,
}

impl Output {
    /// Output callback body: one queued sample per frame, copied to every
    /// channel.
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        let live = self.state == PlayerState::Playing;
        let gain = f32::from(self.volume) / 100.0;
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = if live {
                self.queue.pop_front().unwrap_or(0.0) * gain
            } else {
                0.0
            };
            frame.fill(sample);
        }
        // an open stream that runs dry is an underrun, not the end
        if live && self.queue.is_empty() && !self.streaming {
            self.state = PlayerState::Finished;
            self.ended = true;
        }
    }
}

struct Shared {
    output: Mutex<Output>,
    listener: Mutex<Option<PlayerListener>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            output: Mutex::new(Output {
                queue: VecDeque::new(),
                state: PlayerState::Idle,
                volume: 100,
                streaming: false,
                ended: false,
            }),
            listener: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Output> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, events: &[PlayerEvent]) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            for &event in events {
                listener(event);
            }
        }
    }

    /// Report a track the callback finished.  Runs on the output thread.
    fn report_end(&self) {
        let ended = std::mem::take(&mut self.lock().ended);
        if ended {
            self.notify(&[PlayerEvent::Stopped]);
        }
    }
}

// ---------------------------------------------------------------------------
// CpalPlayer
// ---------------------------------------------------------------------------

/// One output channel on a `cpal` device.
///
/// Two players may share the same device; each opens its own stream and
/// the host mixes them.
pub struct CpalPlayer {
    shared: Arc<Shared>,
    /// Device rate every queued sample is converted to.
    out_rate: u32,
    /// Rate of incoming PCM16 sources and streams.
    pcm_rate: u32,
    /// `None` only for the device-less players in tests.
    _stream: Option<OutputThread>,
}

impl CpalPlayer {
    /// Open the configured output device and start its stream.  `label`
    /// names the output thread.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Device`] when the device is missing or its stream
    /// cannot be built.
    pub fn new(config: &AudioConfig, label: &str) -> Result<Self, PlaybackError> {
        let shared = Arc::new(Shared::new());
        let (stream, out_rate) =
            OutputThread::spawn(config.output_device.clone(), Arc::clone(&shared), label)?;
        log::info!("playback: {label} output at {out_rate} Hz");
        Ok(Self {
            shared,
            out_rate,
            pcm_rate: config.sample_rate,
            _stream: Some(stream),
        })
    }

    fn decode(&self, source: &AudioSource) -> Result<Vec<f32>, PlaybackError> {
        let AudioSource::Memory { codec, data } = source else {
            return Err(PlaybackError::NotSupported(
                "cpal player only plays in-memory sources",
            ));
        };
        match codec {
            Codec::Wav => decode_wav(data, self.out_rate),
            Codec::Pcm => Ok(resample_linear(
                &pcm16_to_f32(data),
                self.pcm_rate,
                self.out_rate,
            )),
            _ => Err(PlaybackError::NotSupported(
                "cpal player decodes WAV and PCM only",
            )),
        }
    }
}

/// Decode a WAV file to mono samples at `out_rate`.
fn decode_wav(data: &[u8], out_rate: u32) -> Result<Vec<f32>, PlaybackError> {
    let bad = |e: hound::Error| PlaybackError::InvalidParameter(format!("bad WAV data: {e}"));
    let mut reader = hound::WavReader::new(Cursor::new(data)).map_err(bad)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(bad)?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(bad)?
        }
    };
    let mono = stereo_to_mono(&samples, spec.channels);
    Ok(resample_linear(&mono, spec.sample_rate, out_rate))
}

impl Player for CpalPlayer {
    fn set_listener(&self, listener: PlayerListener) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn play(&self, source: &AudioSource) -> Result<(), PlaybackError> {
        let samples = self.decode(source)?;
        if samples.is_empty() {
            return Err(PlaybackError::InvalidParameter("empty audio buffer".into()));
        }
        {
            let mut out = self.shared.lock();
            out.queue = samples.into();
            out.streaming = false;
            out.ended = false;
            out.state = PlayerState::Playing;
        }
        self.shared
            .notify(&[PlayerEvent::Started, PlayerEvent::Playing]);
        Ok(())
    }

    fn stream_start(&self, codec: Codec) -> Result<(), PlaybackError> {
        if codec != Codec::Pcm {
            return Err(PlaybackError::NotSupported("cpal player streams PCM only"));
        }
        {
            let mut out = self.shared.lock();
            out.queue.clear();
            out.streaming = true;
            out.ended = false;
            out.state = PlayerState::Started;
        }
        self.shared.notify(&[PlayerEvent::Started]);
        Ok(())
    }

    fn stream_write(&self, data: &[u8]) -> Result<(), PlaybackError> {
        let samples = resample_linear(&pcm16_to_f32(data), self.pcm_rate, self.out_rate);
        let first = {
            let mut out = self.shared.lock();
            if !out.streaming {
                return Err(PlaybackError::InvalidParameter(format!(
                    "stream write while {:?}",
                    out.state
                )));
            }
            out.queue.extend(samples);
            let first = out.state == PlayerState::Started;
            if first {
                out.state = PlayerState::Playing;
            }
            first
        };
        if first {
            self.shared.notify(&[PlayerEvent::Playing]);
        }
        Ok(())
    }

    fn stream_finish(&self) -> Result<(), PlaybackError> {
        let empty = {
            let mut out = self.shared.lock();
            out.streaming = false;
            // nothing was ever written: there is nothing left to drain
            let empty = out.state == PlayerState::Started;
            if empty {
                out.state = PlayerState::Finished;
            }
            empty
        };
        if empty {
            self.shared.notify(&[PlayerEvent::Stopped]);
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        let stopped = {
            let mut out = self.shared.lock();
            out.queue.clear();
            out.streaming = false;
            out.ended = false;
            let busy = matches!(
                out.state,
                PlayerState::Started | PlayerState::Playing | PlayerState::Paused
            );
            if busy {
                out.state = PlayerState::Finished;
            }
            busy
        };
        if stopped {
            self.shared.notify(&[PlayerEvent::Stopped]);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        let paused = {
            let mut out = self.shared.lock();
            let playing = out.state == PlayerState::Playing;
            if playing {
                out.state = PlayerState::Paused;
            }
            playing
        };
        if paused {
            self.shared.notify(&[PlayerEvent::Paused]);
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        let resumed = {
            let mut out = self.shared.lock();
            let paused = out.state == PlayerState::Paused;
            if paused {
                out.state = PlayerState::Playing;
            }
            paused
        };
        if resumed {
            self.shared.notify(&[PlayerEvent::Playing]);
        }
        Ok(())
    }

    fn state(&self) -> PlayerState {
        self.shared.lock().state
    }

    fn set_volume(&self, volume: u8) {
        self.shared.lock().volume = volume.min(100);
    }

    fn volume(&self) -> u8 {
        self.shared.lock().volume
    }
}

// ---------------------------------------------------------------------------
// Output thread
// ---------------------------------------------------------------------------

/// Owns the stream thread.  Dropping it closes the stream.
struct OutputThread {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputThread {
    fn spawn(
        device_name: Option<String>,
        shared: Arc<Shared>,
        label: &str,
    ) -> Result<(Self, u32), PlaybackError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, PlaybackError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(format!("playback-{label}"))
            .spawn(move || {
                let (stream, rate) = match build_stream(device_name.as_deref(), &shared) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(rate));
                loop {
                    match stop_rx.recv_timeout(END_POLL) {
                        Err(RecvTimeoutError::Timeout) => shared.report_end(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                drop(stream);
                log::debug!("playback: output stream closed");
            })
            .map_err(|e| PlaybackError::Device(format!("cannot spawn output thread: {e}")))?;

        // dropped on the error paths, which joins the finished thread
        let handle = Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok(rate)) => Ok((handle, rate)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::Device(
                "output thread exited during setup".into(),
            )),
        }
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            // a listener may drop the last player from the output thread
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

fn find_output(name: Option<&str>) -> Result<cpal::Device, PlaybackError> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::Device(format!("cannot enumerate devices: {e}")))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| PlaybackError::Device(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device".into())),
    }
}

fn build_stream(
    name: Option<&str>,
    shared: &Arc<Shared>,
) -> Result<(cpal::Stream, u32), PlaybackError> {
    let device = find_output(name)?;
    let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::Device(format!("failed to query output config: {e}")))?;

    let rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let config: cpal::StreamConfig = supported.into();
    log::info!("playback: device {device_name}, {rate} Hz x{channels}");

    let output = Arc::clone(shared);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                output.lock().fill(data, channels);
            },
            |err: cpal::StreamError| {
                log::error!("playback: output stream error: {err}");
            },
            None,
        )
        .map_err(|e| PlaybackError::Device(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| PlaybackError::Device(format!("failed to start output stream: {e}")))?;
    Ok((stream, rate))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
