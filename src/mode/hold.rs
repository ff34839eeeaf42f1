//! Hold-to-talk mode.
//!
//! Audio flows only while the talk key is held: press opens the capture gate
//! (Listen), release closes it and waits for the recogniser (Upload).  The
//! capture pipeline is forced into manual VAD for the lifetime of the mode
//! and put back the way it was on deinit.

use std::time::Instant;

use super::session::Session;
use super::{ChatModeHandler, KeyEvent, ModeContext, ModeError, ModeSettings, ModeState, PollArgs};
use crate::audio::VadMode;
use crate::event::Event;
use crate::playback::{AlertType, PlayControl};

pub struct HoldMode {
    session: Session,
    saved_vad: Option<VadMode>,
}

impl HoldMode {
    pub fn new(settings: &ModeSettings) -> Self {
        Self {
            session: Session::new("hold", settings.idle_timeout),
            saved_vad: None,
        }
    }
}

impl ChatModeHandler for HoldMode {
    fn init(&mut self, ctx: &ModeContext) -> Result<(), ModeError> {
        let previous = ctx.capture.vad_mode();
        ctx.capture.wakeup_mode_set(VadMode::Manual)?;
        self.saved_vad = Some(previous);
        ctx.capture.start()?;
        self.session.enter(ctx, ModeState::Idle, Instant::now());
        Ok(())
    }

    fn deinit(&mut self, ctx: &ModeContext) -> Result<(), ModeError> {
        self.session.sleep(ctx, Instant::now());
        ctx.capture.stop()?;
        if let Some(previous) = self.saved_vad.take() {
            ctx.capture.wakeup_mode_set(previous)?;
        }
        Ok(())
    }

    fn poll(&mut self, ctx: &ModeContext, args: &PollArgs) {
        self.session.poll_idle(ctx, args.now);
    }

    fn handle_event(&mut self, ctx: &ModeContext, event: &Event) {
        let now = Instant::now();
        let state = self.session.state();
        match event {
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

    fn on_key(&mut self, ctx: &ModeContext, key: KeyEvent) {
        let now = Instant::now();
        match key {
            KeyEvent::Press => self.session.wake(ctx, AlertType::KeyTalk, now),
            KeyEvent::Release if self.session.state() == ModeState::Listen => {
                ctx.capture.wakeup_set(false);
                self.session.enter(ctx, ModeState::Upload, now);
            }
            _ => {}
        }
    }
}
