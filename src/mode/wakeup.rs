//! Wake-word mode.
//!
//! ```text
//!            wake word / key
//!   Idle ───────────────────▶ Listen ◀──────────── ASR empty / error
//!    ▲                          │ VAD start              ▲
//!    │ idle timeout             ▼                        │ play end (woken)
//!    │ exit                  Upload ── ASR ok ──▶ Think ─┼─ TTS pre-roll ──▶ Speak
//!    └──────────────────────────────────────────────────┴── play end (not woken)
//! ```
//!
//! The conversation stays woken across turns: after each reply the mode
//! returns to Listen until the idle timer expires with nothing playing.

use std::time::Instant;

use super::session::Session;
use super::{
    ChatModeHandler, IdleTimer, KeyEvent, ModeContext, ModeError, ModeSettings, ModeState,
    PollArgs,
};
use crate::audio::VadFlag;
use crate::event::Event;
use crate::playback::{AlertType, PlayControl};

pub struct WakeupMode {
    session: Session,
}

impl WakeupMode {
    pub fn new(settings: &ModeSettings) -> Self {
        Self {
            session: Session::new("wakeup", settings.idle_timeout),
        }
    }

    pub fn idle_timer(&self) -> &IdleTimer {
        self.session.timer()
    }

    pub fn is_woken(&self) -> bool {
        self.session.is_woken()
    }
}

impl ChatModeHandler for WakeupMode {
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
            Event::WakeupDetected => self.session.wake(ctx, AlertType::Wakeup, now),
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
        if matches!(key, KeyEvent::Press | KeyEvent::Click) {
            self.session.wake(ctx, AlertType::WakeupTalk, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::tests::{fixture, CaptureCall, Fixture};
    use crate::playback::{AudioSource, Codec, MusicList, Player, PlayerOp, PlayerState};
    use std::time::Duration;

    fn ready() -> (Fixture, WakeupMode) {
        let f = fixture();
        let mut mode = WakeupMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();
        f.capture.clear();
        f.events.lock().unwrap().clear();
        (f, mode)
    }

    #[test]
    fn init_starts_capture_idle() {
        let f = fixture();
        let mut mode = WakeupMode::new(&f.ctx.settings);
        mode.init(&f.ctx).unwrap();
        assert_eq!(mode.state(), ModeState::Idle);
        assert_eq!(
            f.capture.calls(),
            vec![CaptureCall::Start, CaptureCall::WakeupSet(false)]
        );
    }

    #[test]
    fn wake_word_starts_listening() {
        let (f, mut mode) = ready();
        f.fg.take_ops();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);

        assert_eq!(mode.state(), ModeState::Listen);
        assert!(mode.is_woken());
        let plays = f
            .fg
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, PlayerOp::Play(_)))
            .count();
        assert_eq!(plays, 1);
        assert_eq!(
            f.capture.calls(),
            vec![CaptureCall::Reset, CaptureCall::WakeupSet(true)]
        );
        assert!(mode.idle_timer().is_armed());
        assert_eq!(mode.idle_timer().window(), Duration::from_millis(30_000));
    }

    #[test]
    fn idle_timeout_rearms_while_music_plays() {
        let (f, mut mode) = ready();
        let t0 = Instant::now();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        f.ctx
            .player
            .play_music(&MusicList {
                sources: vec![AudioSource::Url {
                    url: "http://music/a.mp3".into(),
                    codec: Codec::Mp3,
                }],
            })
            .unwrap();
        assert_eq!(f.bg.state(), PlayerState::Playing);

        let expiry = t0 + Duration::from_secs(31);
        mode.poll(&f.ctx, &PollArgs { now: expiry });
        assert_eq!(mode.state(), ModeState::Listen);
        assert_eq!(
            mode.idle_timer().deadline(),
            Some(expiry + Duration::from_millis(30_000))
        );
    }

    #[test]
    fn idle_timeout_sleeps_when_quiet() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        f.fg.complete();

        let later = Instant::now() + Duration::from_secs(31);
        mode.poll(&f.ctx, &PollArgs { now: later });
        assert_eq!(mode.state(), ModeState::Idle);
        assert!(!mode.is_woken());
        assert_eq!(f.capture.calls().last(), Some(&CaptureCall::WakeupSet(false)));
    }

    #[test]
    fn full_turn_returns_to_listen() {
        let (f, mut mode) = ready();
        f.capture.detect_speech();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.on_vad_change(&f.ctx, VadFlag::Start);
        assert_eq!(mode.state(), ModeState::Upload);

        mode.handle_event(&f.ctx, &Event::AsrOk("what time is it".into()));
        mode.handle_event(&f.ctx, &Event::TtsPreRoll);
        assert_eq!(mode.state(), ModeState::Speak);
        assert!(!mode.idle_timer().is_armed());

        mode.handle_event(&f.ctx, &Event::PlayEnd);
        assert_eq!(mode.state(), ModeState::Listen);
        assert_eq!(
            f.states(),
            vec![
                ModeState::Listen,
                ModeState::Upload,
                ModeState::Think,
                ModeState::Speak,
                ModeState::Listen,
            ]
        );
    }

    #[test]
    fn empty_asr_retries() {
        let (f, mut mode) = ready();
        f.capture.detect_speech();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.on_vad_change(&f.ctx, VadFlag::Start);
        mode.handle_event(&f.ctx, &Event::AsrEmpty);
        assert_eq!(mode.state(), ModeState::Listen);
    }

    #[test]
    fn manual_gate_echo_is_not_speech() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.on_vad_change(&f.ctx, VadFlag::Start);
        assert_eq!(mode.state(), ModeState::Listen);

        f.fg.complete();
        let later = Instant::now() + Duration::from_secs(31);
        mode.poll(&f.ctx, &PollArgs { now: later });
        assert_eq!(mode.state(), ModeState::Idle);
    }

    #[test]
    fn silent_agent_times_out_in_upload() {
        let (f, mut mode) = ready();
        f.capture.detect_speech();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.on_vad_change(&f.ctx, VadFlag::Start);
        assert_eq!(mode.state(), ModeState::Upload);

        f.fg.complete();
        let later = Instant::now() + Duration::from_secs(31);
        mode.poll(&f.ctx, &PollArgs { now: later });
        assert_eq!(mode.state(), ModeState::Idle);
        assert!(!mode.is_woken());
    }

    #[test]
    fn asr_while_idle_is_ignored() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::AsrOk("stray".into()));
        mode.handle_event(&f.ctx, &Event::AsrEmpty);
        assert_eq!(mode.state(), ModeState::Idle);
        assert!(f.states().is_empty());
    }

    #[test]
    fn exit_goes_idle() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.handle_event(&f.ctx, &Event::Exit);
        assert_eq!(mode.state(), ModeState::Idle);
        assert!(!mode.is_woken());
    }

    #[test]
    fn key_press_wakes_and_interrupts_speech() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::TtsPreRoll);
        f.fg.stream_start(Codec::Mp3).unwrap();
        f.fg.stream_write(&[0; 8]).unwrap();

        mode.on_key(&f.ctx, KeyEvent::Press);
        assert_eq!(mode.state(), ModeState::Listen);
        assert!(f.fg.ops().contains(&PlayerOp::Stop));
    }

    #[test]
    fn deinit_stops_capture() {
        let (f, mut mode) = ready();
        mode.handle_event(&f.ctx, &Event::WakeupDetected);
        mode.deinit(&f.ctx).unwrap();
        assert_eq!(f.capture.calls().last(), Some(&CaptureCall::Stop));
        assert_eq!(mode.state(), ModeState::Idle);
    }
}
