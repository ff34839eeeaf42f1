//! Voice-interaction core of a conversational device.
//!
//! Three pieces coordinated through one synchronous event bus:
//!
//! ```text
//!  mic ──▶ audio::Recorder ──slices──▶ agent transport
//!              │ MicData / VadChange        │ Inbound
//!              ▼                            ▼
//!          event::EventBus ◀──────── agent::route_inbound
//!              │                            │ TTS phases
//!              ▼                            ▼
//!          mode::ModeEngine ──────▶ playback::PlaybackArbiter
//!              │  wake gate            │ PlayEnd / PlayPause
//!              └──▶ CaptureControl     └──▶ EventBus
//! ```
//!
//! * [`mode`]: the mode registry, the engine and the four interaction styles.
//! * [`audio`]: the VAD capture pipeline and its device/detector boundaries.
//! * [`playback`]: the two-slot playback arbiter with ducking and alerts.

pub mod agent;
pub mod audio;
pub mod config;
pub mod event;
pub mod hotkey;
pub mod mode;
pub mod playback;
pub mod ui;
