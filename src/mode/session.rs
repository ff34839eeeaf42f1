//! Conversation bookkeeping shared by the built-in modes.
//!
//! Entering a state applies its capture-gate and idle-timer side effects:
//!
//! | state  | wake gate          | idle timer |
//! |--------|--------------------|------------|
//! | Idle   | `wakeup_set(false)` | stop       |
//! | Listen | `wakeup_set(true)`  | start      |
//! | Upload | -                  | keep       |
//! | Think  | `wakeup_set(false)` | -          |
//! | Speak  | `wakeup_set(false)` | stop       |

use std::time::{Duration, Instant};

use super::{IdleTimer, ModeContext, ModeState};
use crate::audio::{VadFlag, VadMode};
use crate::event::Event;
use crate::playback::{AlertType, StopScope};

pub(crate) struct Session {
    name: &'static str,
    state: ModeState,
    woken: bool,
    timer: IdleTimer,
}

impl Session {
    pub fn new(name: &'static str, idle_timeout: Duration) -> Self {
        Self {
            name,
            state: ModeState::Init,
            woken: false,
            timer: IdleTimer::new(idle_timeout),
        }
    }

    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn is_woken(&self) -> bool {
        self.woken
    }

    pub fn timer(&self) -> &IdleTimer {
        &self.timer
    }

    /// Move to `next`, applying its side effects.  A `ModeState` event is
    /// published only when the state actually changes.
    pub fn enter(&mut self, ctx: &ModeContext, next: ModeState, now: Instant) {
        match next {
            ModeState::Idle => {
                self.timer.stop();
                ctx.capture.wakeup_set(false);
            }
            ModeState::Listen => {
                ctx.capture.wakeup_set(true);
                self.timer.start(now);
            }
            ModeState::Think => ctx.capture.wakeup_set(false),
            ModeState::Speak => {
                ctx.capture.wakeup_set(false);
                self.timer.stop();
            }
            ModeState::Init | ModeState::Upload | ModeState::Invalid => {}
        }

        if next != self.state {
            log::info!("{} mode: {:?} -> {:?}", self.name, self.state, next);
            self.state = next;
            ctx.bus.publish(Event::ModeState(next));
        }
    }

    /// Interrupt whatever is happening and start listening.
    pub fn wake(&mut self, ctx: &ModeContext, alert: AlertType, now: Instant) {
        if let Err(e) = ctx.player.stop(StopScope::All) {
            log::warn!("{} mode: stopping playback on wake failed: {e}", self.name);
        }
        ctx.capture.reset();
        if let Err(e) = ctx.player.play_alert(alert) {
            log::warn!("{} mode: wake alert failed: {e}", self.name);
        }
        self.woken = true;
        self.enter(ctx, ModeState::Listen, now);
    }

    /// Drop the wake and go idle.
    pub fn sleep(&mut self, ctx: &ModeContext, now: Instant) {
        self.woken = false;
        self.enter(ctx, ModeState::Idle, now);
    }

    /// Playback ended: keep the conversation going if still woken.
    pub fn after_playback(&mut self, ctx: &ModeContext, now: Instant) {
        if self.woken {
            self.enter(ctx, ModeState::Listen, now);
        } else {
            self.enter(ctx, ModeState::Idle, now);
        }
    }

    /// A detector edge: speech in Listen starts the upload.
    ///
    /// Manual capture reports its own gate opening as `VadChange(Start)`
    /// when Listen is entered; that edge is not speech and is ignored.
    pub fn vad_edge(&mut self, ctx: &ModeContext, flag: VadFlag, now: Instant) {
        if ctx.capture.vad_mode() != VadMode::Auto {
            return;
        }
        if flag == VadFlag::Start && self.state == ModeState::Listen {
            self.enter(ctx, ModeState::Upload, now);
        }
    }

    /// Idle-timeout check for Listen, Upload and Think.  Busy playback
    /// rearms the timer instead of ending the conversation.
    pub fn poll_idle(&mut self, ctx: &ModeContext, now: Instant) {
        if !matches!(
            self.state,
            ModeState::Listen | ModeState::Upload | ModeState::Think
        ) {
            return;
        }
        if !self.timer.expired(now) {
            return;
        }
        if ctx.player.is_playing() {
            log::debug!("{} mode: idle timeout while playing, rearming", self.name);
            self.timer.start(now);
        } else {
            log::info!("{} mode: idle timeout", self.name);
            self.sleep(ctx, now);
        }
    }
}
