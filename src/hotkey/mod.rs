//! Global key source for talk and mode switching, backed by `rdev`.
//!
//! Stands in for the device button driver on a desktop: the talk key
//! reports press and release to the active mode, the mode key cycles to the
//! next registered mode.
//!
//! # Design
//!
//! `rdev::listen()` is a blocking OS-level call that never returns while the
//! process is alive.  It must run on a **dedicated OS thread** and cannot be
//! used inside a tokio task.
//!
//! [`HotkeyListener::start`] spawns that dedicated thread and returns a
//! [`HotkeyListener`] handle.  Dropping the handle sets a stop flag so the
//! callback silently discards further events.
//!
//! # Usage
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use voice_chat_core::hotkey::{parse_key, HotkeyListener};
//!
//! let (tx, mut rx) = mpsc::channel(16);
//! let talk = parse_key("F9").expect("unknown key");
//! let next = parse_key("F10").expect("unknown key");
//! let _listener = HotkeyListener::start(talk, next, tx).unwrap();
//!
//! // In your async loop:
//! // while let Some(ev) = rx.recv().await { apply(ev, &engine) }
//! ```

pub mod listener;

pub use listener::HotkeyListener;

use crate::mode::{KeyEvent, ModeEngine};

// ---------------------------------------------------------------------------
// HotkeyEvent
// ---------------------------------------------------------------------------

/// Events emitted by the hotkey listener thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The talk key went down.
    TalkPressed,
    /// The talk key came up.
    TalkReleased,
    /// The mode key was pressed.
    NextMode,
}

/// Hand one hotkey event to the engine.
pub fn apply(event: HotkeyEvent, engine: &ModeEngine) {
    match event {
        HotkeyEvent::TalkPressed => engine.handle_key(KeyEvent::Press),
        HotkeyEvent::TalkReleased => engine.handle_key(KeyEvent::Release),
        HotkeyEvent::NextMode => match engine.switch_to_next() {
            Ok(mode) => log::info!("hotkey: switched to {mode}"),
            Err(e) => log::warn!("hotkey: mode switch failed: {e}"),
        },
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a key name from `settings.toml` into an [`rdev::Key`].
///
/// Accepts `F1` to `F12`, a handful of named keys, and a single letter or
/// digit (letters in either case).  `None` for anything else, so the caller
/// can fall back to its default binding.
///
/// ```
/// use voice_chat_core::hotkey::parse_key;
///
/// assert_eq!(parse_key("F10"), Some(rdev::Key::F10));
/// assert_eq!(parse_key("q"), Some(rdev::Key::KeyQ));
/// assert_eq!(parse_key("Ctrl+Q"), None);
/// ```
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key;

    let key = match name {
        "F1" => Key::F1,
        "F2" => Key::F2,
        "F3" => Key::F3,
        "F4" => Key::F4,
        "F5" => Key::F5,
        "F6" => Key::F6,
        "F7" => Key::F7,
        "F8" => Key::F8,
        "F9" => Key::F9,
        "F10" => Key::F10,
        "F11" => Key::F11,
        "F12" => Key::F12,
        "Space" => Key::Space,
        "Escape" | "Esc" => Key::Escape,
        "Return" | "Enter" => Key::Return,
        "Tab" => Key::Tab,
        "Insert" => Key::Insert,
        "Home" => Key::Home,
        "End" => Key::End,
        "PageUp" => Key::PageUp,
        "PageDown" => Key::PageDown,
        "Pause" => Key::Pause,
        "ScrollLock" => Key::ScrollLock,
        "RightCtrl" => Key::ControlRight,
        "RightAlt" => Key::AltGr,
        other => return single_char_key(other),
    };
    Some(key)
}

fn single_char_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key;

    const LETTERS: [Key; 26] = [
        Key::KeyA, Key::KeyB, Key::KeyC, Key::KeyD, Key::KeyE, Key::KeyF, Key::KeyG,
        Key::KeyH, Key::KeyI, Key::KeyJ, Key::KeyK, Key::KeyL, Key::KeyM, Key::KeyN,
        Key::KeyO, Key::KeyP, Key::KeyQ, Key::KeyR, Key::KeyS, Key::KeyT, Key::KeyU,
        Key::KeyV, Key::KeyW, Key::KeyX, Key::KeyY, Key::KeyZ,
    ];
    const DIGITS: [Key; 10] = [
        Key::Num0, Key::Num1, Key::Num2, Key::Num3, Key::Num4,
        Key::Num5, Key::Num6, Key::Num7, Key::Num8, Key::Num9,
    ];

    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    match c.to_ascii_uppercase() {
        c @ 'A'..='Z' => Some(LETTERS[(c as u8 - b'A') as usize]),
        c @ '0'..='9' => Some(DIGITS[(c as u8 - b'0') as usize]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
