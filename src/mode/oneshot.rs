//! One-shot mode: a single exchange per trigger.
//!
//! A key press or the wake word opens one turn.  The turn ends in Idle once
//! the reply has played, or straight away if the recogniser heard nothing.

use std::time::Instant;

use super::session::Session;
use super::{ChatModeHandler, KeyEvent, ModeContext, ModeError, ModeSettings, ModeState, PollArgs};
use crate::audio::VadFlag;
use crate::event::Event;
use crate::playback::{AlertType, PlayControl};

pub struct OneShotMode {
    session: Session,
}

impl OneShotMode {
    pub fn new(settings: &ModeSettings) -> Self {
        Self {
            session: Session::new("oneshot", settings.idle_timeout),
        }
    }
}

impl ChatModeHandler for OneShotMode {
    fn init(&mut self, ctx: &ModeContext) -> Result<(), ModeError> {
        ctx.capture.start()?;
        self.session.enter(ctx, ModeState::Idle, Instant::now());
        Ok(())
    }

    fn deinit(&mut self, ctx: &ModeContext) -> Result<(), ModeError> {
        self.session.sleep(ctx, Instant::now());
        ctx.capture.stop()?;
        Ok(())
    }

    fn poll(&mut self, ctx: &ModeContext, args: &PollArgs) {
        self.session.poll_idle(ctx, args.now);
    }

    fn handle_event(&mut self, ctx: &ModeContext, event: &Event) {
        let now = Instant::now();
        let state = self.session.state();
        match event {
            Event::WakeupDetected => self.session.wake(ctx, AlertType::KeyTalk, now),
            Event::AsrOk(_) if matches!(state, ModeState::Listen | ModeState::Upload) => {
                self.session.enter(ctx, ModeState::Think, now);
            }
            Event::AsrEmpty | Event::AsrError(_) if state != ModeState::Speak => {
                self.session.sleep(ctx, now);
            }
            Event::TtsPreRoll => self.session.enter(ctx, ModeState::Speak, now),
            Event::PlayEnd | Event::PlayCtl(PlayControl::Stop) if state == ModeState::Speak => {
                self.session.sleep(ctx, now);
            }
            Event::Exit => self.session.sleep(ctx, now),
            _ => {}
        }
    }

    fn state(&self) -> ModeState {
        self.session.state()
    }

    fn on_vad_change(&mut self, ctx: &ModeContext, flag: VadFlag) {
        self.session.vad_edge(ctx, flag, Instant::now());
    }

    fn on_key(&mut self, ctx: &ModeContext, key: KeyEvent) {
        if matches!(key, KeyEvent::Press | KeyEvent::Click) {
            self.session.wake(ctx, AlertType::KeyTalk, Instant::now());
        }
    }
}
