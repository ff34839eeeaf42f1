//! Playback arbiter: foreground speech against background music.
//!
//! # Ducking
//!
//! ```text
//! Foreground → Playing  while Background Playing : bg volume = fg_volume / 2
//! Foreground → Stopped  while Background Playing : bg volume = fg_volume
//! both stopped                                    : Event::PlayEnd
//! ```
//!
//! The arbiter reacts to the players' own notifications, so every decision
//! above is taken on whichever thread the player reports from.  No arbiter
//! lock is ever held while a player is called; players are free to notify
//! synchronously from inside `play`/`stop`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

use super::{
    AlertPlan, AlertSource, AlertType, AudioSource, Codec, PlaybackError, Player, PlayerEvent,
    PlayerRole, PlayerState, Playlist, BACKGROUND_CAPACITY, FOREGROUND_CAPACITY,
};
use crate::event::{Event, EventBus};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Sources for the background player, in play order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MusicList {
    pub sources: Vec<AudioSource>,
}

/// Transport commands from the agent's play-control skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayControl {
    Stop,
    Pause,
    Resume,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopScope {
    Foreground,
    Background,
    All,
}

/// One step of a streamed TTS reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsPhase<'a> {
    Start(Codec),
    Data(&'a [u8]),
    Stop,
    Abort,
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

struct Slot {
    role: PlayerRole,
    player: Arc<dyn Player>,
    playlist: Mutex<Playlist>,
    cancel: Mutex<CancellationToken>,
}

impl Slot {
    fn new(role: PlayerRole, player: Arc<dyn Player>, capacity: usize) -> Self {
        Self {
            role,
            player,
            playlist: Mutex::new(Playlist::new(capacity)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn playlist(&self) -> MutexGuard<'_, Playlist> {
        self.playlist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel in-flight requests and install a fresh token.
    fn cancel_pending(&self) {
        let old = std::mem::replace(
            &mut *self.cancel.lock().unwrap_or_else(PoisonError::into_inner),
            CancellationToken::new(),
        );
        old.cancel();
    }

    fn is_playing(&self) -> bool {
        self.player.state() == PlayerState::Playing
    }

    fn is_busy(&self) -> bool {
        matches!(
            self.player.state(),
            PlayerState::Started | PlayerState::Playing | PlayerState::Paused
        )
    }

    /// Clear the queue, then stop the player.
    fn halt(&self) -> Result<(), PlaybackError> {
        self.playlist().clear();
        self.player.stop().map_err(|e| {
            log::warn!("arbiter: {:?} stop failed: {e}", self.role);
            e
        })
    }

    /// Start the next queued source.  Returns false when the queue is empty.
    fn advance(&self) -> bool {
        let Some(next) = self.playlist().next() else {
            return false;
        };
        log::debug!("arbiter: {:?} advancing playlist", self.role);
        if let Err(e) = self.player.play(&next) {
            log::warn!("arbiter: {:?} failed to play next source: {e}", self.role);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// PlaybackArbiter
// ---------------------------------------------------------------------------

/// Owns the foreground and background player slots.
pub struct PlaybackArbiter {
    fg: Slot,
    bg: Slot,
    bus: Arc<EventBus>,
    alerts: Arc<dyn AlertSource>,
    /// Last explicitly set volume; background volume derives from it.
    fg_volume: AtomicU8,
    ducked: AtomicBool,
    /// Foreground accepts TTS data.  Cleared when the foreground stops.
    tts_armed: AtomicBool,
    /// Between TTS Start and Stop/Abort.
    tts_open: AtomicBool,
    resume: AtomicBool,
    replay: AtomicBool,
}

impl PlaybackArbiter {
    /// Build the arbiter and subscribe to both players' notifications.
    pub fn new(
        foreground: Arc<dyn Player>,
        background: Arc<dyn Player>,
        alerts: Arc<dyn AlertSource>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let volume = foreground.volume();
        let arbiter = Arc::new(Self {
            fg: Slot::new(PlayerRole::Foreground, foreground, FOREGROUND_CAPACITY),
            bg: Slot::new(PlayerRole::Background, background, BACKGROUND_CAPACITY),
            bus,
            alerts,
            fg_volume: AtomicU8::new(volume),
            ducked: AtomicBool::new(false),
            tts_armed: AtomicBool::new(false),
            tts_open: AtomicBool::new(false),
            resume: AtomicBool::new(false),
            replay: AtomicBool::new(false),
        });

        for slot in [&arbiter.fg, &arbiter.bg] {
            let weak: Weak<Self> = Arc::downgrade(&arbiter);
            let role = slot.role;
            slot.player.set_listener(Arc::new(move |event: PlayerEvent| {
                if let Some(arbiter) = weak.upgrade() {
                    arbiter.on_player_event(role, event);
                }
            }));
        }
        arbiter.set_volume(volume);
        log::info!("arbiter: ready, volume {volume}");
        arbiter
    }

    /// Stop everything and detach from the players.
    pub fn deinit(&self) {
        let _ = self.stop(StopScope::All);
        for slot in [&self.fg, &self.bg] {
            slot.player.set_listener(Arc::new(|_: PlayerEvent| {}));
        }
        log::info!("arbiter: deinitialised");
    }

    // ---- requests ------------------------------------------------------------

    /// Replace the background queue with `music` and start its first entry.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidParameter`] for an empty list; nothing is
    /// touched in that case.
    pub fn play_music(&self, music: &MusicList) -> Result<(), PlaybackError> {
        if music.sources.is_empty() {
            return Err(PlaybackError::InvalidParameter("music list is empty".into()));
        }
        let first = {
            let mut playlist = self.bg.playlist();
            playlist.replace(&music.sources);
            playlist.next()
        };
        let Some(first) = first else {
            return Err(PlaybackError::InvalidParameter("music list is empty".into()));
        };

        self.bg.player.set_volume(self.background_volume());
        log::info!("arbiter: playing {} music source(s)", music.sources.len());
        self.bg.player.play(&first)
    }

    /// Drive one phase of a streamed TTS reply on the foreground player.
    pub fn play_tts_stream(&self, phase: TtsPhase<'_>) -> Result<(), PlaybackError> {
        match phase {
            TtsPhase::Start(codec) => {
                self.fg.playlist().clear();
                self.tts_armed.store(true, Ordering::Release);
                self.tts_open.store(true, Ordering::Release);
                if let Err(e) = self.fg.player.stream_start(codec) {
                    log::warn!("arbiter: tts stream start failed: {e}");
                    self.tts_armed.store(false, Ordering::Release);
                    self.tts_open.store(false, Ordering::Release);
                    return Err(e);
                }
                log::debug!("arbiter: tts start ({codec:?})");
                self.bus.publish(Event::TtsPreRoll);
                self.bus.publish(Event::TtsStart);
                Ok(())
            }
            TtsPhase::Data(data) => {
                if data.is_empty() {
                    return Err(PlaybackError::InvalidParameter("empty tts chunk".into()));
                }
                let result = if self.tts_armed.load(Ordering::Acquire) {
                    self.fg.player.stream_write(data)
                } else {
                    log::trace!("arbiter: tts data while not armed, not played");
                    Ok(())
                };
                self.bus.publish(Event::TtsData(data.to_vec()));
                result
            }
            TtsPhase::Stop => {
                if !self.tts_open.swap(false, Ordering::AcqRel) {
                    return Ok(());
                }
                log::debug!("arbiter: tts stop");
                let result = self.fg.player.stream_finish();
                self.bus.publish(Event::TtsStop);
                result
            }
            TtsPhase::Abort => {
                if !self.tts_open.swap(false, Ordering::AcqRel) {
                    return Ok(());
                }
                log::debug!("arbiter: tts abort");
                self.tts_armed.store(false, Ordering::Release);
                let result = self.fg.halt();
                self.bus.publish(Event::TtsAbort);
                result
            }
        }
    }

    /// Play an in-memory buffer on the foreground, replacing whatever is
    /// playing there.
    pub fn play_data(&self, codec: Codec, data: &[u8]) -> Result<(), PlaybackError> {
        if data.is_empty() {
            return Err(PlaybackError::InvalidParameter("empty audio buffer".into()));
        }
        self.fg.halt()?;
        let token = self.fg.token();
        if token.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }
        self.fg.player.play(&AudioSource::Memory {
            codec,
            data: Arc::from(data),
        })
    }

    /// Resolve `alert` through the build's alert strategy and play it on the
    /// foreground, queueing behind anything already there.
    pub fn play_alert(&self, alert: AlertType) -> Result<(), PlaybackError> {
        let token = self.fg.token();
        let plan = self.alerts.resolve(alert)?;
        if token.is_cancelled() {
            log::debug!("arbiter: alert {} cancelled by stop", alert.name());
            return Err(PlaybackError::Cancelled);
        }

        let source = match plan {
            AlertPlan::Play(source) => source,
            AlertPlan::Handled => return Ok(()),
        };
        log::debug!("arbiter: alert {}", alert.name());
        if self.fg.is_busy() {
            self.fg.playlist().push(source).map_err(|e| {
                log::warn!("arbiter: alert {} dropped: {e}", alert.name());
                e
            })
        } else {
            self.fg.player.play(&source)
        }
    }

    /// Clear and stop the requested slot(s).  Safe to repeat.
    pub fn stop(&self, scope: StopScope) -> Result<(), PlaybackError> {
        let mut result = Ok(());
        if matches!(scope, StopScope::Foreground | StopScope::All) {
            self.fg.cancel_pending();
            self.tts_armed.store(false, Ordering::Release);
            self.tts_open.store(false, Ordering::Release);
            result = self.fg.halt();
        }
        if matches!(scope, StopScope::Background | StopScope::All) {
            self.bg.cancel_pending();
            let bg = self.bg.halt();
            if result.is_ok() {
                result = bg;
            }
        }
        result
    }

    /// Apply a play-control command to the background player.
    pub fn play_control(&self, control: PlayControl) -> Result<(), PlaybackError> {
        log::debug!("arbiter: play control {control:?}");
        match control {
            PlayControl::Stop => self.stop(StopScope::Background),
            PlayControl::Pause => self.bg.player.pause(),
            PlayControl::Resume => self.bg.player.resume(),
            PlayControl::Next => {
                if self.bg.advance() {
                    Ok(())
                } else {
                    self.stop(StopScope::Background)
                }
            }
        }
    }

    // ---- state ---------------------------------------------------------------

    pub fn set_resume(&self, resume: bool) {
        self.resume.store(resume, Ordering::Release);
    }

    pub fn resume_enabled(&self) -> bool {
        self.resume.load(Ordering::Acquire)
    }

    pub fn set_replay(&self, replay: bool) {
        self.replay.store(replay, Ordering::Release);
    }

    pub fn replay_enabled(&self) -> bool {
        self.replay.load(Ordering::Acquire)
    }

    /// True iff either player reports Playing.
    pub fn is_playing(&self) -> bool {
        self.fg.is_playing() || self.bg.is_playing()
    }

    pub fn is_tts_armed(&self) -> bool {
        self.tts_armed.load(Ordering::Acquire)
    }

    pub fn is_ducked(&self) -> bool {
        self.ducked.load(Ordering::Acquire)
    }

    pub fn get_volume(&self) -> u8 {
        self.fg_volume.load(Ordering::Acquire)
    }

    /// Set the foreground volume (0..=100); the background follows, halved
    /// while ducked.
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        self.fg_volume.store(volume, Ordering::Release);
        self.fg.player.set_volume(volume);
        self.bg.player.set_volume(self.background_volume());
    }

    /// Sources still queued behind the current one.
    pub fn queued(&self, role: PlayerRole) -> Vec<AudioSource> {
        self.slot(role).playlist().entries()
    }

    fn slot(&self, role: PlayerRole) -> &Slot {
        match role {
            PlayerRole::Foreground => &self.fg,
            PlayerRole::Background => &self.bg,
        }
    }

    fn background_volume(&self) -> u8 {
        let volume = self.get_volume();
        if self.is_ducked() || self.fg.is_playing() {
            volume / 2
        } else {
            volume
        }
    }

    // ---- player notifications ------------------------------------------------

    fn on_player_event(&self, role: PlayerRole, event: PlayerEvent) {
        log::trace!("arbiter: {role:?} {event:?}");
        match event {
            PlayerEvent::Started => {}
            PlayerEvent::Playing => self.on_playing(role),
            PlayerEvent::Paused => self.bus.publish(Event::PlayPause),
            PlayerEvent::Stopped => self.on_stopped(role),
        }
    }

    fn on_playing(&self, role: PlayerRole) {
        let duck = match role {
            PlayerRole::Foreground => self.bg.is_playing(),
            PlayerRole::Background => self.fg.is_playing(),
        };
        if duck && !self.ducked.swap(true, Ordering::AcqRel) {
            let ducked = self.get_volume() / 2;
            log::debug!("arbiter: ducking background to {ducked}");
            self.bg.player.set_volume(ducked);
        }
    }

    fn on_stopped(&self, role: PlayerRole) {
        if role == PlayerRole::Foreground {
            self.tts_armed.store(false, Ordering::Release);
        }
        if self.slot(role).advance() {
            return;
        }

        if !self.fg.is_playing() && !self.bg.is_playing() {
            if self.ducked.swap(false, Ordering::AcqRel) {
                self.bg.player.set_volume(self.get_volume());
            }
            self.bus.publish(Event::PlayEnd);
        } else if role == PlayerRole::Foreground && self.bg.is_playing() {
            if self.ducked.swap(false, Ordering::AcqRel) {
                let volume = self.get_volume();
                log::debug!("arbiter: restoring background to {volume}");
                self.bg.player.set_volume(volume);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
