//! Alert tones and the build-selected strategy that resolves them.
//!
//! | cargo feature     | [`DefaultAlerts`]  | source                               |
//! |-------------------|--------------------|--------------------------------------|
//! | (none)            | [`EmbeddedAlerts`] | tones synthesised in memory as WAV   |
//! | `alert-cloud`     | `CloudAlerts`      | `GET {base}/{name}.mp3`, dingdong on failure |
//! | `alert-callback`  | `CallbackAlerts`   | user callback, nothing is played     |
//!
//! `alert-callback` wins when both features are enabled.

use std::io::Cursor;
use std::sync::Arc;

use super::{AudioSource, Codec, PlaybackError};

// ---------------------------------------------------------------------------
// AlertType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    PowerOn,
    NotActive,
    NetworkConnected,
    NetworkFail,
    NetworkDisconnect,
    BatteryLow,
    PleaseAgain,
    Wakeup,
    LongKeyTalk,
    KeyTalk,
    WakeupTalk,
    FreeTalk,
}

impl AlertType {
    /// File-name style identifier, also used for the cloud URL.
    pub fn name(self) -> &'static str {
        match self {
            AlertType::PowerOn => "power_on",
            AlertType::NotActive => "not_active",
            AlertType::NetworkConnected => "network_connected",
            AlertType::NetworkFail => "network_fail",
            AlertType::NetworkDisconnect => "network_disconnect",
            AlertType::BatteryLow => "battery_low",
            AlertType::PleaseAgain => "please_again",
            AlertType::Wakeup => "wakeup",
            AlertType::LongKeyTalk => "long_key_talk",
            AlertType::KeyTalk => "key_talk",
            AlertType::WakeupTalk => "wakeup_talk",
            AlertType::FreeTalk => "free_talk",
        }
    }

    /// Tone sequence (Hz, ms) for the embedded rendition.
    fn tones(self) -> &'static [(f32, u32)] {
        match self {
            AlertType::PowerOn => &[(523.0, 120), (659.0, 120), (784.0, 200)],
            AlertType::NotActive => &[(330.0, 300)],
            AlertType::NetworkConnected => &[(784.0, 100), (1047.0, 150)],
            AlertType::NetworkFail => &[(440.0, 150), (330.0, 250)],
            AlertType::NetworkDisconnect => &[(523.0, 150), (392.0, 250)],
            AlertType::BatteryLow => &[(392.0, 120), (392.0, 120)],
            AlertType::PleaseAgain => &[(659.0, 120), (523.0, 180)],
            AlertType::Wakeup => &[(988.0, 120)],
            AlertType::LongKeyTalk => &[(880.0, 200)],
            AlertType::KeyTalk => &[(880.0, 80)],
            AlertType::WakeupTalk => &[(988.0, 80), (1319.0, 80)],
            AlertType::FreeTalk => &[(740.0, 80), (988.0, 80)],
        }
    }
}

// ---------------------------------------------------------------------------
// AlertSource
// ---------------------------------------------------------------------------

/// What the arbiter should do with a resolved alert.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertPlan {
    /// Queue this source on the foreground player.
    Play(AudioSource),
    /// The strategy took care of it; play nothing.
    Handled,
}

/// Resolves an [`AlertType`] to something playable.
pub trait AlertSource: Send + Sync {
    fn resolve(&self, alert: AlertType) -> Result<AlertPlan, PlaybackError>;
}

#[cfg(feature = "alert-callback")]
pub type DefaultAlerts = CallbackAlerts;
#[cfg(all(feature = "alert-cloud", not(feature = "alert-callback")))]
pub type DefaultAlerts = CloudAlerts;
#[cfg(not(any(feature = "alert-cloud", feature = "alert-callback")))]
pub type DefaultAlerts = EmbeddedAlerts;

// ---------------------------------------------------------------------------
// Embedded tones
// ---------------------------------------------------------------------------

const TONE_RATE: u32 = 16_000;
const TONE_AMPLITUDE: f32 = 0.4;
/// Fade in/out per tone, in samples, to avoid clicks.
const FADE: usize = 80;

/// Synthesises each alert as a short 16 kHz mono WAV.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedAlerts;

impl AlertSource for EmbeddedAlerts {
    fn resolve(&self, alert: AlertType) -> Result<AlertPlan, PlaybackError> {
        Ok(AlertPlan::Play(wav_source(alert.tones())?))
    }
}

/// The two-tone chime used when nothing better is available.
pub fn dingdong() -> Result<AudioSource, PlaybackError> {
    wav_source(&[(880.0, 180), (660.0, 260)])
}

fn wav_source(tones: &[(f32, u32)]) -> Result<AudioSource, PlaybackError> {
    let data = render_wav(tones).map_err(|e| PlaybackError::Alert(format!("wav encode: {e}")))?;
    Ok(AudioSource::Memory {
        codec: Codec::Wav,
        data: Arc::from(data),
    })
}

fn render_wav(tones: &[(f32, u32)]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: TONE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &(freq, ms) in tones {
            let n = (TONE_RATE as usize * ms as usize) / 1000;
            for i in 0..n {
                let env = (i.min(n - 1 - i).min(FADE) as f32) / FADE as f32;
                let t = i as f32 / TONE_RATE as f32;
                let s = (2.0 * std::f32::consts::PI * freq * t).sin() * TONE_AMPLITUDE * env;
                writer.write_sample((s * i16::MAX as f32) as i16)?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Cloud alerts
// ---------------------------------------------------------------------------

/// Fetches `{base_url}/{name}.mp3`; any failure falls back to [`dingdong`].
#[cfg(feature = "alert-cloud")]
pub struct CloudAlerts {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "alert-cloud")]
impl CloudAlerts {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &crate::config::PlaybackConfig) -> Self {
        Self::new(
            config.alert_base_url.clone(),
            std::time::Duration::from_secs(config.alert_timeout_secs),
        )
    }

    fn fetch(&self, alert: AlertType) -> Result<Vec<u8>, reqwest::Error> {
        let url = format!("{}/{}.mp3", self.base_url, alert.name());
        log::debug!("alert: fetching {url}");
        // The blocking client must not run on an async runtime thread.
        std::thread::scope(|s| {
            s.spawn(|| {
                self.client
                    .get(&url)
                    .send()?
                    .error_for_status()?
                    .bytes()
                    .map(|b| b.to_vec())
            })
            .join()
            .unwrap_or_else(|_| Ok(Vec::new()))
        })
    }
}

#[cfg(feature = "alert-cloud")]
impl AlertSource for CloudAlerts {
    fn resolve(&self, alert: AlertType) -> Result<AlertPlan, PlaybackError> {
        match self.fetch(alert) {
            Ok(data) if !data.is_empty() => Ok(AlertPlan::Play(AudioSource::Memory {
                codec: Codec::Mp3,
                data: Arc::from(data),
            })),
            Ok(_) => {
                log::warn!("alert: empty body for {}, using dingdong", alert.name());
                Ok(AlertPlan::Play(dingdong()?))
            }
            Err(e) => {
                log::warn!("alert: fetch of {} failed ({e}), using dingdong", alert.name());
                Ok(AlertPlan::Play(dingdong()?))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Callback alerts
// ---------------------------------------------------------------------------

/// Hands every alert to a user callback and plays nothing itself.
#[cfg(feature = "alert-callback")]
pub struct CallbackAlerts {
    callback: Arc<dyn Fn(AlertType) + Send + Sync>,
}

#[cfg(feature = "alert-callback")]
impl CallbackAlerts {
    pub fn new(callback: impl Fn(AlertType) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }
}

#[cfg(feature = "alert-callback")]
impl AlertSource for CallbackAlerts {
    fn resolve(&self, alert: AlertType) -> Result<AlertPlan, PlaybackError> {
        (self.callback)(alert);
        Ok(AlertPlan::Handled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
