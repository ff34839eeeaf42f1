//! Free-conversation mode.
//!
//! Once opened the conversation never times out: every reply is followed by
//! Listen again.  A second press of the talk key closes it.

use std::time::Instant;

use super::session::Session;
use super::{ChatModeHandler, KeyEvent, ModeContext, ModeError, ModeSettings, ModeState};
use crate::audio::VadFlag;
use crate::event::Event;
use crate::playback::{AlertType, PlayControl, StopScope};

pub struct FreeMode {
    session: Session,
}

impl FreeMode {
    pub fn new(settings: &ModeSettings) -> Self {
        Self {
            session: Session::new("free", settings.idle_timeout),
        }
    }

    pub fn is_woken(&self) -> bool {
        self.session.is_woken()
    }
}

impl ChatModeHandler for FreeMode {
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

    fn handle_event(&mut self, ctx: &ModeContext, event: &Event) {
        let now = Instant::now();
        let state = self.session.state();
        match event {
            Event::WakeupDetected => self.session.wake(ctx, AlertType::FreeTalk, now),
            Event::AsrOk(_) if matches!(state, ModeState::Listen | ModeState::Upload) => {
                self.session.enter(ctx, ModeState::Think, now);
            }
            Event::AsrEmpty | Event::AsrError(_)
                if self.session.is_woken() && state != ModeState::Speak =>
            {
                self.session.enter(ctx, ModeState::Listen, now);
            }
            Event::TtsPreRoll => self.session.enter(ctx, ModeState::Speak, now),
            Event::PlayEnd | Event::PlayCtl(PlayControl::Stop) if state == ModeState::Speak => {
                self.session.after_playback(ctx, now);
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
        if !matches!(key, KeyEvent::Press | KeyEvent::Click) {
            return;
        }
        let now = Instant::now();
        if self.session.is_woken() {
            if let Err(e) = ctx.player.stop(StopScope::Foreground) {
                log::warn!("free mode: stopping reply failed: {e}");
            }
            self.session.sleep(ctx, now);
        } else {
            self.session.wake(ctx, AlertType::FreeTalk, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::tests::fixture;
    use crate::mode::PollArgs;
    use std::time::Duration;

    #[test]
    fn listens_again_after_every_reply() {
        let f = fixture();
        let mut mode = FreeMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();
        mode.on_key(&f.ctx, KeyEvent::Press);

        for _ in 0..2 {
            mode.on_vad_change(&f.ctx, VadFlag::Start);
            mode.handle_event(&f.ctx, &Event::AsrOk("and then?".into()));
            mode.handle_event(&f.ctx, &Event::TtsPreRoll);
            mode.handle_event(&f.ctx, &Event::PlayEnd);
            assert_eq!(mode.state(), ModeState::Listen);
        }
    }

    #[test]
    fn never_times_out() {
        let f = fixture();
        let mut mode = FreeMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        f.fg.complete();

        let later = Instant::now() + Duration::from_secs(600);
        mode.poll(&f.ctx, &PollArgs { now: later });
        assert_eq!(mode.state(), ModeState::Listen);
        assert!(mode.is_woken());
    }

    #[test]
    fn second_press_closes_the_conversation() {
        let f = fixture();
        let mut mode = FreeMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();

        mode.on_key(&f.ctx, KeyEvent::Press);
        assert!(mode.is_woken());
        mode.on_key(&f.ctx, KeyEvent::Press);
        assert!(!mode.is_woken());
        assert_eq!(mode.state(), ModeState::Idle);
    }

    #[test]
    fn empty_asr_keeps_listening() {
        let f = fixture();
        let mut mode = FreeMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();
        mode.on_key(&f.ctx, KeyEvent::Click);
        mode.on_vad_change(&f.ctx, VadFlag::Start);
        mode.handle_event(&f.ctx, &Event::AsrError("timeout".into()));
        assert_eq!(mode.state(), ModeState::Listen);
    }
}
