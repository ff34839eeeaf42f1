//! Player subsystem boundary.
//!
//! A [`Player`] accepts either a whole source ([`play`](Player::play)) or a
//! pushed stream (`stream_start` → `stream_write`* → `stream_finish`) and
//! reports lifecycle changes to a single [`PlayerListener`]:
//!
//! ```text
//! Idle ──play──▶ Playing ──complete/stop──▶ Finished
//!   └─stream_start─▶ Started ──first write──▶ Playing
//!                               Playing ◀──resume── Paused ◀──pause── Playing
//! ```
//!
//! Listeners are always invoked with no player lock held, so a listener may
//! call straight back into the player.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::PlaybackError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Audio encodings a player is asked to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Mp3,
    Wav,
    Opus,
    OggOpus,
    Speex,
    Pcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Started,
    Playing,
    Finished,
    Paused,
}

/// Notifications emitted by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Started,
    Playing,
    Paused,
    Stopped,
}

/// Something a player can play in one go.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    Url { url: String, codec: Codec },
    Memory { codec: Codec, data: Arc<[u8]> },
}

impl AudioSource {
    pub fn codec(&self) -> Codec {
        match self {
            AudioSource::Url { codec, .. } | AudioSource::Memory { codec, .. } => *codec,
        }
    }
}

pub type PlayerListener = Arc<dyn Fn(PlayerEvent) + Send + Sync>;

/// Interface of one output channel.
pub trait Player: Send + Sync {
    fn set_listener(&self, listener: PlayerListener);
    fn play(&self, source: &AudioSource) -> Result<(), PlaybackError>;
    fn stream_start(&self, codec: Codec) -> Result<(), PlaybackError>;
    fn stream_write(&self, data: &[u8]) -> Result<(), PlaybackError>;
    /// Close the stream; playback ends once written data has drained.
    fn stream_finish(&self) -> Result<(), PlaybackError>;
    /// Stop now.  Stopping an idle player is not an error.
    fn stop(&self) -> Result<(), PlaybackError>;
    fn pause(&self) -> Result<(), PlaybackError>;
    fn resume(&self) -> Result<(), PlaybackError>;
    fn state(&self) -> PlayerState;
    /// Volume in percent, clamped to 0..=100.
    fn set_volume(&self, volume: u8);
    fn volume(&self) -> u8;
}

// ---------------------------------------------------------------------------
// SimulatedPlayer
// ---------------------------------------------------------------------------

/// One call recorded by [`SimulatedPlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerOp {
    Play(AudioSource),
    StreamStart(Codec),
    /// Byte count of one write.
    StreamWrite(usize),
    StreamFinish,
    Stop,
    Pause,
    Resume,
    Volume(u8),
}

struct SimState {
    state: PlayerState,
    volume: u8,
    ops: Vec<PlayerOp>,
}

/// A player that tracks state and volume without producing sound.
///
/// With [`auto_complete`](Self::auto_complete) every track and finished
/// stream ends immediately; otherwise the owner ends it with
/// [`complete`](Self::complete).
///
/// ```rust
/// use voice_chat_core::playback::{Player, PlayerState, SimulatedPlayer, Codec};
///
/// let player = SimulatedPlayer::new();
/// player.stream_start(Codec::Mp3).unwrap();
/// player.stream_write(&[0u8; 16]).unwrap();
/// assert_eq!(player.state(), PlayerState::Playing);
/// player.complete();
/// assert_eq!(player.state(), PlayerState::Finished);
/// ```
pub struct SimulatedPlayer {
    inner: Mutex<SimState>,
    listener: Mutex<Option<PlayerListener>>,
    auto_complete: bool,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimState {
                state: PlayerState::Idle,
                volume: 100,
                ops: Vec::new(),
            }),
            listener: Mutex::new(None),
            auto_complete: false,
        }
    }

    /// A player whose tracks end as soon as they start.
    pub fn auto_complete() -> Self {
        Self {
            auto_complete: true,
            ..Self::new()
        }
    }

    /// End the current track as if it had played out.
    pub fn complete(&self) {
        let ended = {
            let mut st = self.lock();
            match st.state {
                PlayerState::Started | PlayerState::Playing | PlayerState::Paused => {
                    st.state = PlayerState::Finished;
                    true
                }
                _ => false,
            }
        };
        if ended {
            self.notify(&[PlayerEvent::Stopped]);
        }
    }

    /// Every call made so far.
    pub fn ops(&self) -> Vec<PlayerOp> {
        self.lock().ops.clone()
    }

    /// Return and clear the call log.
    pub fn take_ops(&self) -> Vec<PlayerOp> {
        std::mem::take(&mut self.lock().ops)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
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
}

impl Player for SimulatedPlayer {
    fn set_listener(&self, listener: PlayerListener) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn play(&self, source: &AudioSource) -> Result<(), PlaybackError> {
        if let AudioSource::Memory { data, .. } = source {
            if data.is_empty() {
                return Err(PlaybackError::InvalidParameter("empty audio buffer".into()));
            }
        }
        {
            let mut st = self.lock();
            st.ops.push(PlayerOp::Play(source.clone()));
            st.state = PlayerState::Playing;
        }
        self.notify(&[PlayerEvent::Started, PlayerEvent::Playing]);
        if self.auto_complete {
            self.complete();
        }
        Ok(())
    }

    fn stream_start(&self, codec: Codec) -> Result<(), PlaybackError> {
        {
            let mut st = self.lock();
            st.ops.push(PlayerOp::StreamStart(codec));
            st.state = PlayerState::Started;
        }
        self.notify(&[PlayerEvent::Started]);
        Ok(())
    }

    fn stream_write(&self, data: &[u8]) -> Result<(), PlaybackError> {
        let first = {
            let mut st = self.lock();
            let first = match st.state {
                PlayerState::Started => true,
                PlayerState::Playing | PlayerState::Paused => false,
                other => {
                    return Err(PlaybackError::InvalidParameter(format!(
                        "stream write while {other:?}"
                    )))
                }
            };
            if first {
                st.state = PlayerState::Playing;
            }
            st.ops.push(PlayerOp::StreamWrite(data.len()));
            first
        };
        if first {
            self.notify(&[PlayerEvent::Playing]);
        }
        Ok(())
    }

    fn stream_finish(&self) -> Result<(), PlaybackError> {
        self.lock().ops.push(PlayerOp::StreamFinish);
        if self.auto_complete {
            self.complete();
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        let stopped = {
            let mut st = self.lock();
            st.ops.push(PlayerOp::Stop);
            match st.state {
                PlayerState::Started | PlayerState::Playing | PlayerState::Paused => {
                    st.state = PlayerState::Finished;
                    true
                }
                _ => false,
            }
        };
        if stopped {
            self.notify(&[PlayerEvent::Stopped]);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        let paused = {
            let mut st = self.lock();
            st.ops.push(PlayerOp::Pause);
            if st.state == PlayerState::Playing {
                st.state = PlayerState::Paused;
                true
            } else {
                false
            }
        };
        if paused {
            self.notify(&[PlayerEvent::Paused]);
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        let resumed = {
            let mut st = self.lock();
            st.ops.push(PlayerOp::Resume);
            if st.state == PlayerState::Paused {
                st.state = PlayerState::Playing;
                true
            } else {
                false
            }
        };
        if resumed {
            self.notify(&[PlayerEvent::Playing]);
        }
        Ok(())
    }

    fn state(&self) -> PlayerState {
        self.lock().state
    }

    fn set_volume(&self, volume: u8) {
        let mut st = self.lock();
        st.volume = volume.min(100);
        let v = st.volume;
        st.ops.push(PlayerOp::Volume(v));
    }

    fn volume(&self) -> u8 {
        self.lock().volume
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
