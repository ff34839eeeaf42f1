//! Process-wide event bus.
//!
//! Every notification in the core (microphone data, VAD edges, agent
//! results, playback lifecycle, mode transitions) is an [`Event`] published
//! on the single [`EventBus`] owned by the runtime context.  Exactly one
//! subscriber is installed (the mode engine's dispatcher) and delivery is
//! synchronous.
//!
//! # Delivery rules
//!
//! ```text
//! publish(e) ──▶ bus idle?  ── yes ─▶ deliver e now, then drain pending ─▶ release
//!                           └─ no ──▶ append to pending, return immediately
//! ```
//!
//! A publish made while a delivery is already running (from inside the
//! subscriber on the same thread, or concurrently from the capture or player
//! threads) never re-enters the subscriber and never blocks the publisher:
//! the thread that currently owns the bus delivers it before releasing.
//! [`EventBus::serialize`] lets callers run arbitrary work under the same
//! exclusion, which is how the mode engine keeps its poll task, key handling
//! and mode switches from interleaving with event delivery.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crate::audio::VadFlag;
use crate::mode::{ChatMode, ModeState};
use crate::playback::{AlertType, MusicList, PlayControl};

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Skill payloads delivered by the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Skill {
    /// Play a list of music tracks on the background player.
    Music(MusicList),
    /// Any other skill, kept as its raw name for observers.
    Other(String),
}

/// Every notification carried by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // ---- speech recognition -------------------------------------------
    /// The agent recognised the uploaded utterance.
    AsrOk(String),
    /// The agent heard nothing usable.
    AsrEmpty,
    /// Recognition failed on the agent side.
    AsrError(String),

    // ---- speech synthesis ---------------------------------------------
    /// A TTS stream is about to start; modes switch to speaking here.
    TtsPreRoll,
    TtsStart,
    /// Raw TTS bytes as received, published whether or not the foreground
    /// player is armed.
    TtsData(Vec<u8>),
    TtsStop,
    TtsAbort,
    TtsError(String),

    // ---- assistant text stream ----------------------------------------
    TextStart,
    TextData(String),
    TextEnd,
    Emotion(String),

    // ---- skills and playback ------------------------------------------
    Skill(Skill),
    PlayCtl(PlayControl),
    /// Neither player is playing any more.
    PlayEnd,
    PlayPause,
    Alert(AlertType),

    // ---- capture ------------------------------------------------------
    /// One raw microphone frame.
    MicData(Vec<u8>),
    VadChange(VadFlag),
    WakeupDetected,

    // ---- mode engine --------------------------------------------------
    ModeSwitch(ChatMode),
    ModeState(ModeState),

    // ---- agent connection ---------------------------------------------
    ClientConnected,
    ClientDisconnected,

    // ---- video --------------------------------------------------------
    VideoStart,
    VideoStop,

    /// Leave the current conversation.
    Exit,
}

impl Event {
    /// Short stable name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Event::AsrOk(_) => "asr_ok",
            Event::AsrEmpty => "asr_empty",
            Event::AsrError(_) => "asr_error",
            Event::TtsPreRoll => "tts_pre_roll",
            Event::TtsStart => "tts_start",
            Event::TtsData(_) => "tts_data",
            Event::TtsStop => "tts_stop",
            Event::TtsAbort => "tts_abort",
            Event::TtsError(_) => "tts_error",
            Event::TextStart => "text_start",
            Event::TextData(_) => "text_data",
            Event::TextEnd => "text_end",
            Event::Emotion(_) => "emotion",
            Event::Skill(_) => "skill",
            Event::PlayCtl(_) => "play_ctl",
            Event::PlayEnd => "play_end",
            Event::PlayPause => "play_pause",
            Event::Alert(_) => "alert",
            Event::MicData(_) => "mic_data",
            Event::VadChange(_) => "vad_change",
            Event::WakeupDetected => "wakeup",
            Event::ModeSwitch(_) => "mode_switch",
            Event::ModeState(_) => "mode_state",
            Event::ClientConnected => "client_connected",
            Event::ClientDisconnected => "client_disconnected",
            Event::VideoStart => "video_start",
            Event::VideoStop => "video_stop",
            Event::Exit => "exit",
        }
    }

    /// `true` for high-rate audio payloads that should only be traced.
    pub fn is_audio(&self) -> bool {
        matches!(self, Event::MicData(_) | Event::TtsData(_))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// The subscriber callback.
pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Gate {
    owner: Option<ThreadId>,
    pending: VecDeque<Event>,
}

/// Single-subscriber, synchronous event bus.
///
/// Held behind an `Arc` in the runtime context and shared with the capture
/// pipeline, the playback arbiter and the mode engine.
#[derive(Default)]
pub struct EventBus {
    subscriber: RwLock<Option<Subscriber>>,
    gate: Mutex<Gate>,
    released: Condvar,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process-wide subscriber, replacing any previous one.
    pub fn subscribe(&self, subscriber: impl Fn(&Event) + Send + Sync + 'static) {
        let mut slot = self
            .subscriber
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            log::warn!("event bus: replacing existing subscriber");
        }
        *slot = Some(Arc::new(subscriber));
    }

    /// Remove the subscriber.  Later events are dropped.
    pub fn unsubscribe(&self) {
        *self
            .subscriber
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Publish `event`.
    ///
    /// Delivered before this call returns unless another delivery is in
    /// progress, in which case the owner of that delivery hands it over.
    pub fn publish(&self, event: Event) {
        if event.is_audio() {
            log::trace!("event bus: publish {}", event.name());
        } else {
            log::debug!("event bus: publish {}", event.name());
        }

        {
            let mut gate = self.lock_gate();
            gate.pending.push_back(event);
            if gate.owner.is_some() {
                return;
            }
            gate.owner = Some(thread::current().id());
        }

        let _release = Release(self);
        self.drain();
    }

    /// Queue `event` without delivering it.
    ///
    /// For real-time threads that must not run the subscriber.  Queued
    /// events go out with the next [`publish`](Self::publish),
    /// [`serialize`](Self::serialize) or [`flush`](Self::flush).
    pub fn post(&self, event: Event) {
        if event.is_audio() {
            log::trace!("event bus: post {}", event.name());
        } else {
            log::debug!("event bus: post {}", event.name());
        }
        self.lock_gate().pending.push_back(event);
    }

    /// Deliver queued events on this thread.  Returns at once if the queue
    /// is empty or another delivery is in progress.
    pub fn flush(&self) {
        {
            let mut gate = self.lock_gate();
            if gate.owner.is_some() || gate.pending.is_empty() {
                return;
            }
            gate.owner = Some(thread::current().id());
        }

        let _release = Release(self);
        self.drain();
    }

    /// Run `f` with exclusive access to the bus.
    ///
    /// Events published by `f` are delivered after it returns.  Nested calls
    /// on the owning thread run `f` directly.
    pub fn serialize<R>(&self, f: impl FnOnce() -> R) -> R {
        let me = thread::current().id();
        {
            let mut gate = self.lock_gate();
            if gate.owner == Some(me) {
                drop(gate);
                return f();
            }
            while gate.owner.is_some() {
                gate = self
                    .released
                    .wait(gate)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            gate.owner = Some(me);
        }

        let _release = Release(self);
        let out = f();
        self.drain();
        out
    }

    /// Number of events waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock_gate().pending.len()
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut gate = self.lock_gate();
                match gate.pending.pop_front() {
                    Some(event) => event,
                    None => {
                        gate.owner = None;
                        self.released.notify_all();
                        return;
                    }
                }
            };
            self.deliver(&next);
        }
    }

    fn deliver(&self, event: &Event) {
        let subscriber = self
            .subscriber
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match subscriber {
            Some(subscriber) => subscriber(event),
            None => log::trace!("event bus: no subscriber, dropping {}", event.name()),
        }
    }

    fn lock_gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases ownership if the owning call unwinds before draining.
struct Release<'a>(&'a EventBus);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut gate = self.0.lock_gate();
        if gate.owner == Some(thread::current().id()) {
            gate.owner = None;
            self.0.released.notify_all();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
