//! Mode engine: the single bus subscriber and the poll task.
//!
//! Every event goes through the same sequence:
//!
//! ```text
//!  Event ──▶ active mode (handle_event / on_vad_change / on_client_connect)
//!        ──▶ cross-cutting: PlayCtl → arbiter.play_control
//!                           Skill::Music → arbiter.play_music
//!                           Alert → arbiter.play_alert
//!                           ModeState / ModeSwitch / AsrOk / TextData / Emotion → UI
//!                           ClientConnected / ClientDisconnected → UI notice
//!                           ModeSwitch → persist {volume, chat_mode}
//!        ──▶ observer
//! ```
//!
//! Nothing here vetoes: the mode and the cross-cutting step both always run.
//!
//! Entry points that touch the registry from outside the bus (switching,
//! keys, the poll tick) run inside [`EventBus::serialize`], so a mode is
//! never entered from two threads at once and every event a mode publishes
//! is delivered after its call returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{ChatMode, ChatModeHandler, KeyEvent, ModeContext, ModeError, ModeRegistry, ModeState};
use crate::config::{PersistedState, STATE_KEY};
use crate::event::{Event, Skill};
use crate::playback::PlaybackError;
use crate::ui::DisplayKind;

/// Poll period of the engine task.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long [`ModeEngine::shutdown`] waits for the poll task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Receives every event after the engine has handled it.
pub type Observer = Arc<dyn Fn(&Event) + Send + Sync>;

// ---------------------------------------------------------------------------
// Poll task
// ---------------------------------------------------------------------------

struct PollTask {
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl PollTask {
    fn spawn(engine: Weak<ModeEngine>, interval: Duration) -> Result<Self, ModeError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("mode-poll".into())
            .spawn(move || {
                log::debug!("engine: poll task started ({interval:?})");
                while !flag.load(Ordering::Acquire) {
                    match engine.upgrade() {
                        Some(engine) => engine.poll(),
                        None => break,
                    }
                    thread::sleep(interval);
                }
                log::debug!("engine: poll task exiting");
                let _ = done_tx.send(());
            })?;

        Ok(Self { stop, done, thread })
    }

    fn shutdown(self, timeout: Duration) -> Result<(), ModeError> {
        self.stop.store(true, Ordering::Release);
        // the last engine handle can be dropped by the poll thread itself
        if self.thread.thread().id() == thread::current().id() {
            return Ok(());
        }
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("engine: poll task did not stop within {timeout:?}, detaching");
                Err(ModeError::ShutdownTimeout(timeout))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ModeEngine
// ---------------------------------------------------------------------------

pub struct ModeEngine {
    ctx: ModeContext,
    registry: Mutex<ModeRegistry>,
    observer: RwLock<Option<Observer>>,
    task: Mutex<Option<PollTask>>,
}

impl ModeEngine {
    /// Build the engine and install it as the bus subscriber.
    pub fn new(ctx: ModeContext, registry: ModeRegistry) -> Arc<Self> {
        let engine = Arc::new(Self {
            ctx,
            registry: Mutex::new(registry),
            observer: RwLock::new(None),
            task: Mutex::new(None),
        });

        let weak = Arc::downgrade(&engine);
        engine.ctx.bus.subscribe(move |event| {
            if let Some(engine) = weak.upgrade() {
                engine.on_event(event);
            }
        });
        engine
    }

    pub fn context(&self) -> &ModeContext {
        &self.ctx
    }

    /// Install the observer that sees every event last.
    pub fn set_observer(&self, observer: impl Fn(&Event) + Send + Sync + 'static) {
        *self
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(observer));
    }

    pub fn register(
        &self,
        mode: ChatMode,
        handler: Box<dyn ChatModeHandler>,
    ) -> Result<(), ModeError> {
        self.ctx
            .bus
            .serialize(|| self.lock_registry().register(mode, handler))
    }

    /// See [`ModeRegistry::switch_to`].
    pub fn switch_to(&self, mode: ChatMode) -> Result<bool, ModeError> {
        self.ctx
            .bus
            .serialize(|| self.lock_registry().switch_to(&self.ctx, mode))
    }

    /// See [`ModeRegistry::switch_to_next`].
    pub fn switch_to_next(&self) -> Result<ChatMode, ModeError> {
        self.ctx
            .bus
            .serialize(|| self.lock_registry().switch_to_next(&self.ctx))
    }

    /// Publish `event` on the bus; the engine receives it as the subscriber.
    pub fn dispatch(&self, event: Event) {
        self.ctx.bus.publish(event);
    }

    /// One poll tick at the current time.
    pub fn poll(&self) {
        self.poll_at(Instant::now());
    }

    pub fn poll_at(&self, now: Instant) {
        self.ctx
            .bus
            .serialize(|| self.lock_registry().poll(&self.ctx, now));
    }

    pub fn handle_key(&self, key: KeyEvent) {
        log::debug!("engine: key {key:?}");
        self.ctx
            .bus
            .serialize(|| self.lock_registry().on_key(&self.ctx, key));
    }

    pub fn state(&self) -> ModeState {
        self.ctx.bus.serialize(|| self.lock_registry().state())
    }

    pub fn active(&self) -> Option<ChatMode> {
        self.ctx.bus.serialize(|| self.lock_registry().active())
    }

    pub fn modes(&self) -> Vec<ChatMode> {
        self.lock_registry().modes()
    }

    /// Set the playback volume and persist it.
    pub fn set_volume(&self, volume: u8) {
        self.ctx.player.set_volume(volume);
        let mode = self.active().unwrap_or_default();
        self.persist(mode);
    }

    /// Re-apply the persisted volume and mode.  A missing or unreadable
    /// record, or a stored mode that is not registered, falls back to
    /// `fallback`.  Returns the mode that ended up active.
    pub fn restore_state(&self, fallback: ChatMode) -> Result<ChatMode, ModeError> {
        let stored = self
            .ctx
            .store
            .get(STATE_KEY)
            .and_then(|raw| match serde_json::from_slice::<PersistedState>(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::warn!("engine: ignoring unreadable persisted state: {e}");
                    None
                }
            });

        let mode = match stored {
            Some(state) => {
                log::info!(
                    "engine: restoring volume {} and mode {}",
                    state.volume,
                    state.chat_mode
                );
                self.ctx.player.set_volume(state.volume);
                match self.switch_to(state.chat_mode) {
                    Ok(_) => return Ok(state.chat_mode),
                    Err(ModeError::NotRegistered(m)) => {
                        log::warn!("engine: persisted mode {m} not registered, using {fallback}");
                        fallback
                    }
                    Err(e) => return Err(e),
                }
            }
            None => fallback,
        };

        self.switch_to(mode)?;
        Ok(mode)
    }

    /// Start the poll task.  A second call is a no-op.
    pub fn spawn_poll(self: &Arc<Self>, interval: Duration) -> Result<(), ModeError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_none() {
            *task = Some(PollTask::spawn(Arc::downgrade(self), interval)?);
        }
        Ok(())
    }

    /// Stop the poll task, deinitialise the active mode and leave the bus.
    pub fn shutdown(&self) -> Result<(), ModeError> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let polled = match task {
            Some(task) => task.shutdown(SHUTDOWN_TIMEOUT),
            None => Ok(()),
        };

        let deinit = self
            .ctx
            .bus
            .serialize(|| self.lock_registry().deactivate(&self.ctx));
        if let Err(e) = deinit {
            log::warn!("engine: deinit on shutdown failed: {e}");
        }
        self.ctx.bus.unsubscribe();
        polled
    }

    // ---- subscriber ----------------------------------------------------------

    fn on_event(&self, event: &Event) {
        {
            let mut registry = self.lock_registry();
            match event {
                Event::VadChange(flag) => registry.on_vad_change(&self.ctx, *flag),
                Event::ClientConnected => registry.on_client_connect(&self.ctx),
                other => registry.handle_event(&self.ctx, other),
            }
        }

        self.cross_cutting(event);

        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            observer(event);
        }
    }

    fn cross_cutting(&self, event: &Event) {
        let player = &self.ctx.player;
        let ui = &self.ctx.ui;
        match event {
            Event::PlayCtl(control) => {
                if let Err(e) = player.play_control(*control) {
                    log::warn!("engine: play control {control:?} failed: {e}");
                }
            }
            Event::Skill(Skill::Music(music)) => {
                if let Err(e) = player.play_music(music) {
                    log::warn!("engine: music skill failed: {e}");
                }
            }
            Event::Alert(alert) => match player.play_alert(*alert) {
                Ok(()) => {}
                Err(PlaybackError::Cancelled) => {
                    log::debug!("engine: alert {} cancelled", alert.name());
                }
                Err(e) => log::warn!("engine: alert {} failed: {e}", alert.name()),
            },
            Event::ModeState(state) => ui.display(DisplayKind::State, state.label().as_bytes()),
            Event::ModeSwitch(mode) => {
                ui.display(DisplayKind::Mode, mode.to_string().as_bytes());
                self.persist(*mode);
            }
            Event::AsrOk(text) => ui.display(DisplayKind::UserText, text.as_bytes()),
            Event::TextData(text) => ui.display(DisplayKind::AiText, text.as_bytes()),
            Event::Emotion(emotion) => ui.display(DisplayKind::Emotion, emotion.as_bytes()),
            Event::ClientConnected => ui.display(DisplayKind::Notice, b"agent connected"),
            Event::ClientDisconnected => ui.display(DisplayKind::Notice, b"agent disconnected"),
            _ => {}
        }
    }

    fn persist(&self, mode: ChatMode) {
        let state = PersistedState {
            volume: self.ctx.player.get_volume(),
            chat_mode: mode,
        };
        match serde_json::to_vec(&state) {
            Ok(raw) => {
                if let Err(e) = self.ctx.store.set(STATE_KEY, &raw) {
                    log::warn!("engine: persisting state failed: {e}");
                }
            }
            Err(e) => log::warn!("engine: encoding state failed: {e}"),
        }
    }

    fn lock_registry(&self) -> MutexGuard<'_, ModeRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ModeEngine {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.shutdown(SHUTDOWN_TIMEOUT);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{ScriptedDevice, ScriptedVad};
    use crate::audio::{Recorder, VadFlag, VadMode, VoiceDetector};
    use crate::config::{MemoryStore, VadConfig};
    use crate::event::EventBus;
    use crate::mode::tests::{fixture, Fixture};
    use crate::mode::{ModeSettings, PollArgs, WakeupMode};
    use crate::playback::{
        AlertType, AudioSource, Codec, EmbeddedAlerts, MusicList, PlayControl, PlaybackArbiter,
        Player, PlayerRole, PlayerState, SimulatedPlayer,
    };
    use crate::ui::LogDisplay;

    /// Records what reaches it and republishes one event from `handle_event`.
    struct Echo {
        seen: Arc<Mutex<Vec<String>>>,
        polls: Arc<Mutex<u32>>,
    }

    impl ChatModeHandler for Echo {
        fn handle_event(&mut self, ctx: &ModeContext, event: &Event) {
            self.seen.lock().unwrap().push(format!("mode {}", event.name()));
            if *event == Event::TextStart {
                ctx.bus.publish(Event::TextEnd);
            }
        }

        fn poll(&mut self, _ctx: &ModeContext, _args: &PollArgs) {
            *self.polls.lock().unwrap() += 1;
        }

        fn state(&self) -> ModeState {
            ModeState::Idle
        }
    }

    struct Rig {
        f: Fixture,
        engine: Arc<ModeEngine>,
        seen: Arc<Mutex<Vec<String>>>,
        polls: Arc<Mutex<u32>>,
    }

    fn rig() -> Rig {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let polls = Arc::new(Mutex::new(0));
        let mut registry = ModeRegistry::new();
        registry
            .register(
                ChatMode::Custom(0x100),
                Box::new(Echo {
                    seen: Arc::clone(&seen),
                    polls: Arc::clone(&polls),
                }),
            )
            .unwrap();
        let engine = ModeEngine::new(f.ctx.clone(), registry);
        let sink = Arc::clone(&seen);
        engine.set_observer(move |e| sink.lock().unwrap().push(format!("observer {}", e.name())));
        Rig {
            f,
            engine,
            seen,
            polls,
        }
    }

    fn music(n: usize) -> MusicList {
        MusicList {
            sources: (0..n)
                .map(|i| AudioSource::Url {
                    url: format!("http://music/{i}.mp3"),
                    codec: Codec::Mp3,
                })
                .collect(),
        }
    }

    // ---- Dispatch order -------------------------------------------------------

    #[test]
    fn mode_runs_before_observer() {
        let r = rig();
        r.engine.switch_to(ChatMode::Custom(0x100)).unwrap();
        r.seen.lock().unwrap().clear();

        r.engine.dispatch(Event::AsrEmpty);
        assert_eq!(
            *r.seen.lock().unwrap(),
            vec!["mode asr_empty", "observer asr_empty"]
        );
    }

    #[test]
    fn event_published_by_a_mode_is_delivered_after_it() {
        let r = rig();
        r.engine.switch_to(ChatMode::Custom(0x100)).unwrap();
        r.seen.lock().unwrap().clear();

        r.engine.dispatch(Event::TextStart);
        assert_eq!(
            *r.seen.lock().unwrap(),
            vec![
                "mode text_start",
                "observer text_start",
                "mode text_end",
                "observer text_end",
            ]
        );
        assert_eq!(r.f.ctx.bus.pending(), 0);
    }

    #[test]
    fn events_without_active_mode_still_reach_observer() {
        let r = rig();
        r.engine.dispatch(Event::Exit);
        assert_eq!(*r.seen.lock().unwrap(), vec!["observer exit"]);
    }

    // ---- Cross-cutting --------------------------------------------------------

    #[test]
    fn music_skill_and_play_control_drive_background() {
        let r = rig();
        r.engine.dispatch(Event::Skill(Skill::Music(music(3))));
        assert_eq!(r.f.bg.state(), PlayerState::Playing);
        assert_eq!(r.f.ctx.player.queued(PlayerRole::Background).len(), 2);

        r.engine.dispatch(Event::PlayCtl(PlayControl::Pause));
        assert_eq!(r.f.bg.state(), PlayerState::Paused);

        r.engine.dispatch(Event::PlayCtl(PlayControl::Stop));
        assert_eq!(r.f.bg.state(), PlayerState::Finished);
        assert!(r.seen.lock().unwrap().contains(&"observer play_end".to_string()));
    }

    #[test]
    fn alert_event_plays_on_foreground() {
        let r = rig();
        r.engine.dispatch(Event::Alert(AlertType::Wakeup));
        assert_eq!(r.f.fg.state(), PlayerState::Playing);
    }

    #[test]
    fn state_and_text_reach_the_ui() {
        let r = rig();
        r.engine.dispatch(Event::ModeState(ModeState::Think));
        r.engine.dispatch(Event::AsrOk("turn on the light".into()));
        r.engine.dispatch(Event::Emotion("happy".into()));

        let shown = r.f.ui.shown.lock().unwrap().clone();
        assert_eq!(
            shown,
            vec![
                (DisplayKind::State, "thinking".to_string()),
                (DisplayKind::UserText, "turn on the light".to_string()),
                (DisplayKind::Emotion, "happy".to_string()),
            ]
        );
    }

    #[test]
    fn agent_link_changes_show_as_notices() {
        let r = rig();
        r.engine.dispatch(Event::ClientConnected);
        r.engine.dispatch(Event::ClientDisconnected);

        let shown = r.f.ui.shown.lock().unwrap().clone();
        assert_eq!(
            shown,
            vec![
                (DisplayKind::Notice, "agent connected".to_string()),
                (DisplayKind::Notice, "agent disconnected".to_string()),
            ]
        );
    }

    // ---- Persistence ---------------------------------------------------------

    #[test]
    fn switch_persists_mode_and_volume() {
        let r = rig();
        r.engine.set_volume(40);
        r.engine.switch_to(ChatMode::Custom(0x100)).unwrap();

        let raw = r.f.ctx.store.get(STATE_KEY).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json, serde_json::json!({"volume": 40, "chat_mode": 256}));
        assert!(r
            .f
            .ui
            .shown
            .lock()
            .unwrap()
            .contains(&(DisplayKind::Mode, "custom-0x100".to_string())));
    }

    #[test]
    fn restore_applies_persisted_state() {
        let f = fixture();
        f.ctx
            .store
            .set(STATE_KEY, br#"{"volume": 35, "chat_mode": 2}"#)
            .unwrap();
        let mut registry = ModeRegistry::new();
        registry
            .register(ChatMode::Wakeup, Box::new(WakeupMode::new(&f.ctx.settings)))
            .unwrap();
        let engine = ModeEngine::new(f.ctx.clone(), registry);

        assert_eq!(engine.restore_state(ChatMode::Hold).unwrap(), ChatMode::Wakeup);
        assert_eq!(engine.active(), Some(ChatMode::Wakeup));
        assert_eq!(f.ctx.player.get_volume(), 35);
        assert_eq!(engine.state(), ModeState::Idle);
    }

    #[test]
    fn restore_falls_back_on_bad_record() {
        let r = rig();
        r.f.ctx.store.set(STATE_KEY, b"not json").unwrap();
        let mode = r.engine.restore_state(ChatMode::Custom(0x100)).unwrap();
        assert_eq!(mode, ChatMode::Custom(0x100));
        assert_eq!(r.engine.active(), Some(mode));
    }

    #[test]
    fn restore_falls_back_on_unregistered_mode() {
        let r = rig();
        r.f.ctx
            .store
            .set(STATE_KEY, br#"{"volume": 70, "chat_mode": 3}"#)
            .unwrap();
        let mode = r.engine.restore_state(ChatMode::Custom(0x100)).unwrap();
        assert_eq!(mode, ChatMode::Custom(0x100));
    }

    // ---- Poll task -----------------------------------------------------------

    #[test]
    fn poll_reaches_active_mode_only() {
        let r = rig();
        r.engine.poll();
        assert_eq!(*r.polls.lock().unwrap(), 0);

        r.engine.switch_to(ChatMode::Custom(0x100)).unwrap();
        r.engine.poll();
        r.engine.poll();
        assert_eq!(*r.polls.lock().unwrap(), 2);
    }

    #[test]
    fn poll_task_runs_until_shutdown() {
        let r = rig();
        r.engine.switch_to(ChatMode::Custom(0x100)).unwrap();
        r.engine.spawn_poll(Duration::from_millis(2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while *r.polls.lock().unwrap() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(*r.polls.lock().unwrap() >= 3);

        r.engine.shutdown().unwrap();
        let after = *r.polls.lock().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(*r.polls.lock().unwrap(), after);
        assert_eq!(r.engine.active(), None);
    }

    // ---- Wakeup over the real recorder -----------------------------------------

    struct Live {
        engine: Arc<ModeEngine>,
        recorder: Arc<Recorder>,
        device: ScriptedDevice,
        fg: Arc<SimulatedPlayer>,
        slices: Arc<Mutex<usize>>,
    }

    fn live(mode: VadMode, detector: Option<Arc<dyn VoiceDetector>>) -> Live {
        let bus = Arc::new(EventBus::new());
        let device = ScriptedDevice::default();
        let slices = Arc::new(Mutex::new(0usize));
        let out = Arc::clone(&slices);
        let vad = VadConfig {
            mode,
            off_ms: 500,
            active_ms: 20,
            slice_ms: 10,
        };
        let recorder = Arc::new(
            Recorder::init(
                &vad,
                &device,
                detector,
                Arc::clone(&bus),
                Arc::new(move |_: &[u8]| *out.lock().unwrap() += 1),
            )
            .unwrap(),
        );

        let fg = Arc::new(SimulatedPlayer::new());
        let player = PlaybackArbiter::new(
            fg.clone(),
            Arc::new(SimulatedPlayer::new()),
            Arc::new(EmbeddedAlerts),
            Arc::clone(&bus),
        );
        let ctx = ModeContext {
            bus,
            capture: recorder.clone(),
            player,
            ui: Arc::new(LogDisplay),
            store: Arc::new(MemoryStore::default()),
            settings: ModeSettings::default(),
        };
        let mut registry = ModeRegistry::new();
        registry
            .register(ChatMode::Wakeup, Box::new(WakeupMode::new(&ctx.settings)))
            .unwrap();
        let engine = ModeEngine::new(ctx, registry);
        engine.switch_to(ChatMode::Wakeup).unwrap();

        Live {
            engine,
            recorder,
            device,
            fg,
            slices,
        }
    }

    fn wait_for(what: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !what() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn manual_wake_listens_then_times_out() {
        let l = live(VadMode::Manual, None);
        assert_eq!(l.engine.state(), ModeState::Idle);

        l.engine.handle_key(KeyEvent::Press);
        assert_eq!(l.engine.state(), ModeState::Listen);
        assert!(l.recorder.is_woken());
        assert_eq!(l.recorder.vad_flag(), VadFlag::Start);

        // the gate is open: audio flows while still in Listen
        l.device.push(&[0u8; 640]);
        assert!(wait_for(|| *l.slices.lock().unwrap() >= 2));
        assert_eq!(l.engine.state(), ModeState::Listen);

        l.fg.complete();
        l.engine.poll_at(Instant::now() + Duration::from_secs(31));
        assert_eq!(l.engine.state(), ModeState::Idle);
        assert!(!l.recorder.is_woken());
        assert_eq!(l.recorder.vad_flag(), VadFlag::Stop);
        l.engine.shutdown().unwrap();
    }

    #[test]
    fn auto_speech_uploads_then_times_out() {
        let vad = ScriptedVad::new();
        let l = live(VadMode::Auto, Some(vad.clone()));

        l.engine.handle_key(KeyEvent::Press);
        assert_eq!(l.engine.state(), ModeState::Listen);

        vad.set_speech(true);
        assert!(wait_for(|| l.engine.state() == ModeState::Upload));
        l.device.push(&[0u8; 320]);
        assert!(wait_for(|| *l.slices.lock().unwrap() >= 1));

        // the agent never answers
        l.fg.complete();
        l.engine.poll_at(Instant::now() + Duration::from_secs(31));
        assert_eq!(l.engine.state(), ModeState::Idle);
        assert!(!l.recorder.is_woken());
        l.engine.shutdown().unwrap();
    }
}
