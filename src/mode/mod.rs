//! Interaction modes: registry, engine and the four built-in styles.
//!
//! A mode is a [`ChatModeHandler`]: a capability set whose methods all
//! default to no-ops.  The [`ModeRegistry`] owns every registered handler
//! and tracks the active one; the [`ModeEngine`] subscribes to the event bus,
//! forwards events and key presses to the active handler, runs the 20 ms
//! poll task and performs the cross-cutting work (play-control, music,
//! alerts, UI, persistence).
//!
//! ```text
//!  EventBus ──▶ ModeEngine ──▶ active ChatModeHandler ──▶ ModeContext
//!                  │                                       ├─ CaptureControl
//!                  ├─▶ PlaybackArbiter (cross-cutting)     ├─ PlaybackArbiter
//!                  ├─▶ UiDisplay                           └─ EventBus
//!                  └─▶ observer
//! ```

pub mod engine;
pub mod free;
pub mod hold;
pub mod oneshot;
pub mod registry;
mod session;
pub mod timer;
pub mod wakeup;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{CaptureControl, CaptureError, VadFlag};
use crate::config::KvStore;
use crate::event::{Event, EventBus};
use crate::playback::{PlaybackArbiter, PlaybackError};
use crate::ui::UiDisplay;

pub use engine::ModeEngine;
pub use free::FreeMode;
pub use hold::HoldMode;
pub use oneshot::OneShotMode;
pub use registry::ModeRegistry;
pub use timer::IdleTimer;
pub use wakeup::WakeupMode;

// ---------------------------------------------------------------------------
// ChatMode
// ---------------------------------------------------------------------------

/// First id available to custom modes.
pub const CUSTOM_MODE_BASE: u16 = 0x100;

/// Identifier of an interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum ChatMode {
    #[default]
    Hold,
    OneShot,
    Wakeup,
    Free,
    /// Application-defined mode, id ≥ [`CUSTOM_MODE_BASE`].
    Custom(u16),
}

impl ChatMode {
    pub fn id(self) -> u16 {
        match self {
            ChatMode::Hold => 0,
            ChatMode::OneShot => 1,
            ChatMode::Wakeup => 2,
            ChatMode::Free => 3,
            ChatMode::Custom(id) => id,
        }
    }

    /// A custom mode id.
    ///
    /// # Errors
    ///
    /// [`ModeError::InvalidId`] below [`CUSTOM_MODE_BASE`].
    pub fn custom(id: u16) -> Result<Self, ModeError> {
        if id < CUSTOM_MODE_BASE {
            return Err(ModeError::InvalidId(id));
        }
        Ok(ChatMode::Custom(id))
    }
}

impl TryFrom<u16> for ChatMode {
    type Error = ModeError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(ChatMode::Hold),
            1 => Ok(ChatMode::OneShot),
            2 => Ok(ChatMode::Wakeup),
            3 => Ok(ChatMode::Free),
            id => ChatMode::custom(id),
        }
    }
}

impl From<ChatMode> for u16 {
    fn from(mode: ChatMode) -> Self {
        mode.id()
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMode::Hold => f.write_str("hold"),
            ChatMode::OneShot => f.write_str("oneshot"),
            ChatMode::Wakeup => f.write_str("wakeup"),
            ChatMode::Free => f.write_str("free"),
            ChatMode::Custom(id) => write!(f, "custom-{id:#x}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ModeState
// ---------------------------------------------------------------------------

/// Conversation state reported by the active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeState {
    Init,
    Idle,
    Listen,
    Upload,
    Think,
    Speak,
    /// Returned when no mode is active or a mode reports nothing.
    Invalid,
}

impl ModeState {
    /// Text shown by the UI.
    pub fn label(self) -> &'static str {
        match self {
            ModeState::Init => "init",
            ModeState::Idle => "idle",
            ModeState::Listen => "listening",
            ModeState::Upload => "uploading",
            ModeState::Think => "thinking",
            ModeState::Speak => "speaking",
            ModeState::Invalid => "invalid",
        }
    }
}

// ---------------------------------------------------------------------------
// Keys / poll
// ---------------------------------------------------------------------------

/// Button gestures delivered to the active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press,
    Release,
    Click,
    DoubleClick,
    LongPress,
}

/// Arguments of one poll tick.
#[derive(Debug, Clone, Copy)]
pub struct PollArgs {
    pub now: Instant,
}

// ---------------------------------------------------------------------------
// ModeError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("mode {0} is already registered")]
    AlreadyRegistered(ChatMode),

    #[error("mode {0} is not registered")]
    NotRegistered(ChatMode),

    #[error("custom mode id {0:#x} is below 0x100")]
    InvalidId(u16),

    #[error("mode {mode} failed to initialise: {reason}")]
    Init { mode: ChatMode, reason: String },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("failed to spawn mode poll task: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("mode poll task did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

// ---------------------------------------------------------------------------
// ModeContext
// ---------------------------------------------------------------------------

/// Tunables shared by the built-in modes.
#[derive(Debug, Clone, Copy)]
pub struct ModeSettings {
    /// Window of the single-shot idle timer.
    pub idle_timeout: Duration,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Everything a mode may touch, passed to every handler call.
#[derive(Clone)]
pub struct ModeContext {
    pub bus: Arc<EventBus>,
    pub capture: Arc<dyn CaptureControl>,
    pub player: Arc<PlaybackArbiter>,
    pub ui: Arc<dyn UiDisplay>,
    pub store: Arc<dyn KvStore>,
    pub settings: ModeSettings,
}

// ---------------------------------------------------------------------------
// ChatModeHandler
// ---------------------------------------------------------------------------

/// Capability set of an interaction mode.  Every method is optional.
///
/// Handlers run under the event bus exclusion: they must not block, and any
/// event they publish is delivered after the current call returns.
pub trait ChatModeHandler: Send {
    fn init(&mut self, _ctx: &ModeContext) -> Result<(), ModeError> {
        Ok(())
    }

    fn deinit(&mut self, _ctx: &ModeContext) -> Result<(), ModeError> {
        Ok(())
    }

    fn poll(&mut self, _ctx: &ModeContext, _args: &PollArgs) {}

    fn handle_event(&mut self, _ctx: &ModeContext, _event: &Event) {}

    fn state(&self) -> ModeState {
        ModeState::Invalid
    }

    fn on_client_connect(&mut self, _ctx: &ModeContext) {}

    fn on_vad_change(&mut self, _ctx: &ModeContext, _flag: VadFlag) {}

    fn on_key(&mut self, _ctx: &ModeContext, _key: KeyEvent) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
