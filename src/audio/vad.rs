//! Voice activity detection for Auto-mode capture.
//!
//! [`VoiceDetector`] is the seam to a hardware (or DSP) detector: the
//! capture task polls [`status`](VoiceDetector::status) every cycle and
//! turns edges into `VadChange` events.  Detectors that need the audio
//! itself receive every captured frame through [`feed`](VoiceDetector::feed).
//!
//! [`EnergyVad`] is the built-in detector.  It classifies each frame by RMS
//! amplitude and applies hysteresis:
//!
//! ```text
//! Silence ──voiced for active_ms──▶ Speech ──unvoiced for off_ms──▶ Silence
//! ```

use std::sync::{Mutex, PoisonError};

use super::{pcm16_to_f32, AudioFormat, CaptureError};

// ---------------------------------------------------------------------------
// VoiceDetector
// ---------------------------------------------------------------------------

/// Detector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadStatus {
    Speech,
    Silence,
}

/// Interface of a voice activity detector.
pub trait VoiceDetector: Send + Sync {
    fn start(&self) -> Result<(), CaptureError>;
    fn stop(&self);
    fn status(&self) -> VadStatus;
    /// Offer one captured PCM frame.  Default: ignored.
    fn feed(&self, _frame: &[u8]) {}
}

// ---------------------------------------------------------------------------
// EnergyVad
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct EnergyState {
    running: bool,
    speech: bool,
    voiced_ms: u32,
    unvoiced_ms: u32,
}

/// RMS-threshold detector with speech/silence hysteresis.
///
/// # Example
///
/// ```rust
/// use voice_chat_core::audio::{AudioFormat, EnergyVad, VadStatus, VoiceDetector, f32_to_pcm16};
///
/// let vad = EnergyVad::new(AudioFormat::default(), 0.02, 20, 100);
/// vad.start().unwrap();
///
/// let loud = f32_to_pcm16(&vec![0.5_f32; 320]); // 20 ms at 16 kHz
/// vad.feed(&loud);
/// assert_eq!(vad.status(), VadStatus::Speech);
/// ```
pub struct EnergyVad {
    format: AudioFormat,
    rms_threshold: f32,
    active_ms: u32,
    off_ms: u32,
    state: Mutex<EnergyState>,
}

impl EnergyVad {
    /// `active_ms` of voiced audio switch to Speech; `off_ms` of unvoiced
    /// audio switch back to Silence.
    pub fn new(format: AudioFormat, rms_threshold: f32, active_ms: u32, off_ms: u32) -> Self {
        Self {
            format,
            rms_threshold,
            active_ms,
            off_ms,
            state: Mutex::new(EnergyState::default()),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.rms_threshold
    }

    fn is_voiced(&self, frame: &[u8]) -> bool {
        let samples = pcm16_to_f32(frame);
        if samples.is_empty() {
            return false;
        }
        let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        mean_sq.sqrt() > self.rms_threshold
    }
}

impl VoiceDetector for EnergyVad {
    fn start(&self) -> Result<(), CaptureError> {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *st = EnergyState {
            running: true,
            ..EnergyState::default()
        };
        Ok(())
    }

    fn stop(&self) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *st = EnergyState::default();
    }

    fn status(&self) -> VadStatus {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if st.running && st.speech {
            VadStatus::Speech
        } else {
            VadStatus::Silence
        }
    }

    fn feed(&self, frame: &[u8]) {
        let bytes_per_ms = self.format.bytes_per_ms().max(1);
        let frame_ms = (frame.len() / bytes_per_ms) as u32;
        let voiced = self.is_voiced(frame);

        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !st.running {
            return;
        }
        if voiced {
            st.voiced_ms = st.voiced_ms.saturating_add(frame_ms);
            st.unvoiced_ms = 0;
            if !st.speech && st.voiced_ms >= self.active_ms {
                log::debug!("energy vad: speech");
                st.speech = true;
            }
        } else {
            st.unvoiced_ms = st.unvoiced_ms.saturating_add(frame_ms);
            st.voiced_ms = 0;
            if st.speech && st.unvoiced_ms >= self.off_ms {
                log::debug!("energy vad: silence");
                st.speech = false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::f32_to_pcm16;

    /// 10 ms of constant amplitude at 16 kHz mono.
    fn frame(amplitude: f32) -> Vec<u8> {
        f32_to_pcm16(&vec![amplitude; 160])
    }

    fn running_vad(active_ms: u32, off_ms: u32) -> EnergyVad {
        let vad = EnergyVad::new(AudioFormat::default(), 0.02, active_ms, off_ms);
        vad.start().unwrap();
        vad
    }

    #[test]
    fn needs_active_ms_of_voice() {
        let vad = running_vad(30, 100);
        vad.feed(&frame(0.5));
        vad.feed(&frame(0.5));
        assert_eq!(vad.status(), VadStatus::Silence);
        vad.feed(&frame(0.5));
        assert_eq!(vad.status(), VadStatus::Speech);
    }

    #[test]
    fn silence_gap_resets_voice_run() {
        let vad = running_vad(30, 100);
        vad.feed(&frame(0.5));
        vad.feed(&frame(0.5));
        vad.feed(&frame(0.0));
        vad.feed(&frame(0.5));
        assert_eq!(vad.status(), VadStatus::Silence);
    }

    #[test]
    fn returns_to_silence_after_off_ms() {
        let vad = running_vad(10, 30);
        vad.feed(&frame(0.5));
        assert_eq!(vad.status(), VadStatus::Speech);

        vad.feed(&frame(0.0));
        vad.feed(&frame(0.0));
        assert_eq!(vad.status(), VadStatus::Speech);
        vad.feed(&frame(0.0));
        assert_eq!(vad.status(), VadStatus::Silence);
    }

    #[test]
    fn stopped_detector_ignores_frames() {
        let vad = EnergyVad::new(AudioFormat::default(), 0.02, 10, 30);
        vad.feed(&frame(0.5));
        assert_eq!(vad.status(), VadStatus::Silence);

        vad.start().unwrap();
        vad.feed(&frame(0.5));
        vad.stop();
        assert_eq!(vad.status(), VadStatus::Silence);
    }
}
