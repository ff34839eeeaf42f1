//! `rdev` listener thread.
//!
//! `rdev::listen` blocks its thread for the life of the process and offers
//! no way to stop it.  Dropping [`HotkeyListener`] only mutes it: raw events
//! keep arriving but are no longer classified or forwarded.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rdev::{EventType, Key};
use tokio::sync::mpsc;

use super::HotkeyEvent;

/// Turns raw key transitions into [`HotkeyEvent`]s.
///
/// The OS repeats `KeyPress` while a key is held; only the first press of
/// the talk key is reported until it is released.
#[derive(Debug)]
pub(crate) struct KeyMap {
    talk: Key,
    next_mode: Key,
    talk_held: bool,
}

impl KeyMap {
    pub(crate) fn new(talk: Key, next_mode: Key) -> Self {
        Self {
            talk,
            next_mode,
            talk_held: false,
        }
    }

    pub(crate) fn classify(&mut self, event: &EventType) -> Option<HotkeyEvent> {
        match *event {
            EventType::KeyPress(key) if key == self.talk => {
                if self.talk_held {
                    return None;
                }
                self.talk_held = true;
                Some(HotkeyEvent::TalkPressed)
            }
            EventType::KeyRelease(key) if key == self.talk => {
                self.talk_held = false;
                Some(HotkeyEvent::TalkReleased)
            }
            EventType::KeyPress(key) if key == self.next_mode => Some(HotkeyEvent::NextMode),
            _ => None,
        }
    }
}

/// A running listener thread.
pub struct HotkeyListener {
    muted: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Start listening for `talk` (press and release) and `next_mode`
    /// (press).  Events go to `tx` with `blocking_send`, so the receiver may
    /// live on a tokio runtime.
    ///
    /// # Errors
    ///
    /// The listener thread could not be spawned.
    pub fn start(talk: Key, next_mode: Key, tx: mpsc::Sender<HotkeyEvent>) -> io::Result<Self> {
        let muted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&muted);
        let mut keys = KeyMap::new(talk, next_mode);

        // detached: the thread only ends with the process
        thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                log::debug!("hotkey: listening for {talk:?} / {next_mode:?}");
                let outcome = rdev::listen(move |raw| {
                    if flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let Some(event) = keys.classify(&raw.event_type) else {
                        return;
                    };
                    if tx.blocking_send(event).is_err() {
                        log::debug!("hotkey: receiver gone, dropped {event:?}");
                    }
                });
                if let Err(e) = outcome {
                    log::error!("hotkey: rdev::listen failed: {e:?}");
                }
            })?;

        Ok(Self { muted })
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.muted.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_talk_key_reports_one_press() {
        let mut keys = KeyMap::new(Key::F9, Key::F10);
        assert_eq!(
            keys.classify(&EventType::KeyPress(Key::F9)),
            Some(HotkeyEvent::TalkPressed)
        );
        assert_eq!(keys.classify(&EventType::KeyPress(Key::F9)), None);
        assert_eq!(
            keys.classify(&EventType::KeyRelease(Key::F9)),
            Some(HotkeyEvent::TalkReleased)
        );
        assert_eq!(
            keys.classify(&EventType::KeyPress(Key::F9)),
            Some(HotkeyEvent::TalkPressed)
        );
    }

    #[test]
    fn mode_key_fires_on_press_only() {
        let mut keys = KeyMap::new(Key::F9, Key::F10);
        assert_eq!(
            keys.classify(&EventType::KeyPress(Key::F10)),
            Some(HotkeyEvent::NextMode)
        );
        assert_eq!(keys.classify(&EventType::KeyRelease(Key::F10)), None);
        assert_eq!(keys.classify(&EventType::KeyPress(Key::KeyA)), None);
    }
}
