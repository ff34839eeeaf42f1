//! `settings.toml`: one section per subsystem.
//!
//! Every section is `#[serde(default)]`, so a file naming a handful of keys
//! is complete.  Values are checked by [`AppConfig::validate`] on load.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::VadMode;
use crate::mode::{ChatMode, ModeSettings};

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Capture device and its output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate delivered to the pipeline in Hz; the device is resampled to it.
    pub sample_rate: u32,
    /// Bits per sample.  Only 16 is supported by the cpal device.
    pub bit_depth: u16,
    pub channels: u16,
    /// Input device name, `None` for the system default.
    pub input_device: Option<String>,
    /// Output device name for both player slots, `None` for the default.
    pub output_device: Option<String>,
    /// RMS level (0.0 – 1.0) above which the energy detector hears voice.
    pub vad_threshold: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            bit_depth: 16,
            channels: 1,
            input_device: None,
            output_device: None,
            vad_threshold: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------
// VadConfig
// ---------------------------------------------------------------------------

/// Capture pipeline gating and slicing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// `manual`: the wake gate opens the pipeline.  `auto`: the detector does.
    pub mode: VadMode,
    /// Silence needed before the detector reports the end of speech.
    pub off_ms: u32,
    /// Voice needed before the detector reports speech.  Also sizes the
    /// ring buffer.
    pub active_ms: u32,
    /// Duration of one output slice.
    pub slice_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            mode: VadMode::Manual,
            off_ms: 1000,
            active_ms: 200,
            slice_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// ModeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Mode used when nothing usable is persisted.
    pub default_mode: ChatMode,
    pub idle_timeout_ms: u64,
    /// Period of the mode poll task.
    pub poll_interval_ms: u64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            default_mode: ChatMode::Wakeup,
            idle_timeout_ms: 30_000,
            poll_interval_ms: 20,
        }
    }
}

impl ModeConfig {
    pub fn settings(&self) -> ModeSettings {
        ModeSettings {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Volume (0 – 100) used until one is persisted.
    pub default_volume: u8,
    /// Base URL of the cloud alert service (`alert-cloud` builds only).
    pub alert_base_url: String,
    /// Maximum seconds to wait for a cloud alert before falling back.
    pub alert_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: 70,
            alert_base_url: "http://localhost:8080/alerts".into(),
            alert_timeout_secs: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global hotkey bindings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Talk key name (e.g. `"F9"`); press and release are both reported.
    pub talk_key: String,
    /// Key that cycles to the next interaction mode.
    pub mode_key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            talk_key: "F9".into(),
            mode_key: "F10".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Everything read from `settings.toml`.
///
/// ```rust,no_run
/// use voice_chat_core::config::AppConfig;
///
/// let mut config = AppConfig::load().unwrap();
/// config.playback.default_volume = 50;
/// config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub mode: ModeConfig,
    pub playback: PlaybackConfig,
    pub hotkey: HotkeyConfig,
}

impl AppConfig {
    /// [`load_from`](Self::load_from) the platform settings file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Parse and validate `path`.  A missing file is not an error: the
    /// defaults are returned.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("config: {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        let config: Self =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// [`save_to`](Self::save_to) the platform settings file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Write `path` through a sibling temp file so a crash never leaves a
    /// half-written config behind.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }

    /// No settings file has been written yet.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }

    /// Reject values the capture pipeline or the arbiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.channels == 0 || self.audio.sample_rate == 0 {
            bail!("audio: sample_rate and channels must be non-zero");
        }
        if self.audio.bit_depth != 16 {
            bail!("audio: only 16-bit PCM is produced, got bit_depth = {}", self.audio.bit_depth);
        }
        if self.vad.slice_ms == 0 {
            bail!("vad: slice_ms must be non-zero");
        }
        if self.playback.default_volume > 100 {
            bail!("playback: default_volume {} is above 100", self.playback.default_volume);
        }
        if self.mode.idle_timeout_ms == 0 {
            bail!("mode: idle_timeout_ms must be non-zero");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
