//! Playback side of the core: two player slots and the arbiter between them.
//!
//! ```text
//!            ┌──────────── PlaybackArbiter ────────────┐
//!  TTS/alert │ Foreground: Player + Playlist(2)        │──▶ PlayerEvent ─┐
//!  music     │ Background: Player + Playlist(32)       │──▶ PlayerEvent ─┤
//!            └─────────────────────────────────────────┘                 │
//!                 ▲ duck / un-duck, advance playlist   ◀─────────────────┘
//!                 └─▶ Event::{PlayEnd, PlayPause, Tts*} on the bus
//! ```
//!
//! Codec decoding and the audio output path live behind [`Player`].
//! [`CpalPlayer`] plays WAV and PCM16 on a speaker; [`SimulatedPlayer`]
//! models the state machine only.

pub mod alert;
pub mod arbiter;
pub mod cpal_player;
pub mod player;
pub mod playlist;

use thiserror::Error;

pub use alert::{AlertPlan, AlertSource, AlertType, DefaultAlerts, EmbeddedAlerts};
#[cfg(feature = "alert-callback")]
pub use alert::CallbackAlerts;
#[cfg(feature = "alert-cloud")]
pub use alert::CloudAlerts;
pub use arbiter::{MusicList, PlayControl, PlaybackArbiter, StopScope, TtsPhase};
pub use cpal_player::CpalPlayer;
pub use player::{
    AudioSource, Codec, Player, PlayerEvent, PlayerListener, PlayerOp, PlayerState,
    SimulatedPlayer,
};
pub use playlist::{Playlist, BACKGROUND_CAPACITY, FOREGROUND_CAPACITY};

/// Which logical output a player serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerRole {
    /// Speech and alerts.
    Foreground,
    /// Music.
    Background,
}

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("invalid playback parameter: {0}")]
    InvalidParameter(String),

    #[error("playlist full ({0} entries)")]
    PlaylistFull(usize),

    #[error("not supported: {0}")]
    NotSupported(&'static str),

    #[error("player error: {0}")]
    Device(String),

    #[error("alert error: {0}")]
    Alert(String),

    /// A concurrent stop cancelled the request before it reached the player.
    #[error("playback cancelled")]
    Cancelled,
}
