//! Mode registry.  Owns every handler and tracks the active one.
//!
//! Registration order is the cycle order of [`ModeRegistry::switch_to_next`].
//!
//! # Switching
//!
//! ```text
//! switch_to(m):  m unknown        → Err(NotRegistered), nothing changes
//!                m already active → Ok(false), no deinit/init
//!                otherwise        → deinit(active) (errors logged)
//!                                   active = none
//!                                   init(m) ── Err → Err, no mode active
//!                                           └─ Ok  → active = m, Event::ModeSwitch(m)
//! ```

use std::time::Instant;

use super::{
    ChatMode, ChatModeHandler, KeyEvent, ModeContext, ModeError, ModeState, PollArgs,
    CUSTOM_MODE_BASE,
};
use crate::audio::VadFlag;
use crate::event::Event;

struct Entry {
    mode: ChatMode,
    handler: Box<dyn ChatModeHandler>,
}

/// Ordered set of registered modes plus the active index.
#[derive(Default)]
pub struct ModeRegistry {
    entries: Vec<Entry>,
    active: Option<usize>,
}

impl ModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` under `mode`.
    ///
    /// # Errors
    ///
    /// [`ModeError::AlreadyRegistered`] if `mode`'s id is taken; the existing
    /// handler is kept.  [`ModeError::InvalidId`] for a custom mode built
    /// with a reserved id.
    pub fn register(
        &mut self,
        mode: ChatMode,
        handler: Box<dyn ChatModeHandler>,
    ) -> Result<(), ModeError> {
        if let ChatMode::Custom(id) = mode {
            if id < CUSTOM_MODE_BASE {
                return Err(ModeError::InvalidId(id));
            }
        }
        if self.position(mode).is_some() {
            return Err(ModeError::AlreadyRegistered(mode));
        }
        log::debug!("registry: registered {mode}");
        self.entries.push(Entry { mode, handler });
        Ok(())
    }

    /// Make `mode` the active mode.  Returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// [`ModeError::NotRegistered`] leaves the current mode untouched.  An
    /// `init` error is returned as-is and leaves no mode active.
    pub fn switch_to(&mut self, ctx: &ModeContext, mode: ChatMode) -> Result<bool, ModeError> {
        let target = self
            .position(mode)
            .ok_or(ModeError::NotRegistered(mode))?;
        if self.active == Some(target) {
            return Ok(false);
        }

        if let Some(current) = self.active.take() {
            let entry = &mut self.entries[current];
            if let Err(e) = entry.handler.deinit(ctx) {
                log::warn!("registry: deinit of {} failed: {e}", entry.mode);
            }
        }

        self.entries[target].handler.init(ctx).map_err(|e| {
            log::error!("registry: init of {mode} failed: {e}");
            e
        })?;
        self.active = Some(target);
        log::info!("registry: switched to {mode}");
        ctx.bus.publish(Event::ModeSwitch(mode));
        Ok(true)
    }

    /// Advance to the next mode in registration order, wrapping around.
    /// With no active mode the first one is chosen; an empty registry returns
    /// the default mode and does nothing.
    pub fn switch_to_next(&mut self, ctx: &ModeContext) -> Result<ChatMode, ModeError> {
        if self.entries.is_empty() {
            return Ok(ChatMode::default());
        }
        let next = match self.active {
            Some(i) => (i + 1) % self.entries.len(),
            None => 0,
        };
        let mode = self.entries[next].mode;
        self.switch_to(ctx, mode)?;
        Ok(mode)
    }

    /// Deinitialise the active mode, leaving none active.
    pub fn deactivate(&mut self, ctx: &ModeContext) -> Result<(), ModeError> {
        match self.active.take() {
            Some(i) => self.entries[i].handler.deinit(ctx),
            None => Ok(()),
        }
    }

    pub fn active(&self) -> Option<ChatMode> {
        self.active.map(|i| self.entries[i].mode)
    }

    pub fn state(&self) -> ModeState {
        self.active
            .map(|i| self.entries[i].handler.state())
            .unwrap_or(ModeState::Invalid)
    }

    pub fn is_registered(&self, mode: ChatMode) -> bool {
        self.position(mode).is_some()
    }

    /// Registered modes in cycle order.
    pub fn modes(&self) -> Vec<ChatMode> {
        self.entries.iter().map(|e| e.mode).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ---- forwarding to the active handler ------------------------------------

    pub fn poll(&mut self, ctx: &ModeContext, now: Instant) {
        if let Some(handler) = self.active_handler() {
            handler.poll(ctx, &PollArgs { now });
        }
    }

    pub fn handle_event(&mut self, ctx: &ModeContext, event: &Event) {
        if let Some(handler) = self.active_handler() {
            handler.handle_event(ctx, event);
        }
    }

    pub fn on_vad_change(&mut self, ctx: &ModeContext, flag: VadFlag) {
        if let Some(handler) = self.active_handler() {
            handler.on_vad_change(ctx, flag);
        }
    }

    pub fn on_client_connect(&mut self, ctx: &ModeContext) {
        if let Some(handler) = self.active_handler() {
            handler.on_client_connect(ctx);
        }
    }

    pub fn on_key(&mut self, ctx: &ModeContext, key: KeyEvent) {
        if let Some(handler) = self.active_handler() {
            handler.on_key(ctx, key);
        }
    }

    fn active_handler(&mut self) -> Option<&mut Box<dyn ChatModeHandler>> {
        let i = self.active?;
        Some(&mut self.entries[i].handler)
    }

    /// Modes are keyed by id: `Custom(2)` and `Wakeup` are the same slot.
    fn position(&self, mode: ChatMode) -> Option<usize> {
        let id = mode.id();
        self.entries.iter().position(|e| e.mode.id() == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::tests::fixture;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<String>>,
    }

    impl Calls {
        fn push(&self, s: String) {
            self.log.lock().unwrap().push(s);
        }
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }
    }

    struct Scripted {
        name: &'static str,
        calls: Arc<Calls>,
        fail_init: bool,
        fail_deinit: bool,
    }

    impl ChatModeHandler for Scripted {
        fn init(&mut self, _ctx: &ModeContext) -> Result<(), ModeError> {
            self.calls.push(format!("init {}", self.name));
            if self.fail_init {
                return Err(ModeError::Init {
                    mode: ChatMode::Free,
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }

        fn deinit(&mut self, _ctx: &ModeContext) -> Result<(), ModeError> {
            self.calls.push(format!("deinit {}", self.name));
            if self.fail_deinit {
                return Err(ModeError::Init {
                    mode: ChatMode::Hold,
                    reason: "scripted deinit".into(),
                });
            }
            Ok(())
        }

        fn state(&self) -> ModeState {
            ModeState::Idle
        }
    }

    fn scripted(name: &'static str, calls: &Arc<Calls>) -> Box<Scripted> {
        Box::new(Scripted {
            name,
            calls: Arc::clone(calls),
            fail_init: false,
            fail_deinit: false,
        })
    }

    fn four(calls: &Arc<Calls>) -> ModeRegistry {
        let mut reg = ModeRegistry::new();
        reg.register(ChatMode::Hold, scripted("hold", calls)).unwrap();
        reg.register(ChatMode::OneShot, scripted("oneshot", calls)).unwrap();
        reg.register(ChatMode::Wakeup, scripted("wakeup", calls)).unwrap();
        reg.register(ChatMode::Free, scripted("free", calls)).unwrap();
        reg
    }

    // ---- Registration --------------------------------------------------------

    #[test]
    fn duplicate_registration_is_rejected() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);
        reg.switch_to(&f.ctx, ChatMode::Hold).unwrap();

        let err = reg
            .register(ChatMode::Hold, scripted("impostor", &calls))
            .unwrap_err();
        assert!(matches!(err, ModeError::AlreadyRegistered(ChatMode::Hold)));
        assert_eq!(reg.len(), 4);

        calls.take();
        reg.switch_to(&f.ctx, ChatMode::OneShot).unwrap();
        assert_eq!(calls.take(), vec!["deinit hold", "init oneshot"]);
    }

    #[test]
    fn custom_mode_cannot_shadow_builtin_id() {
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);

        let err = reg
            .register(ChatMode::Custom(2), scripted("shadow", &calls))
            .unwrap_err();
        assert!(matches!(err, ModeError::InvalidId(2)));
        assert_eq!(reg.len(), 4);
        assert_eq!(
            reg.modes().iter().map(|m| m.id()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn custom_modes_are_keyed_by_id() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = ModeRegistry::new();
        let custom = ChatMode::custom(0x140).unwrap();
        reg.register(custom, scripted("custom", &calls)).unwrap();

        assert!(matches!(
            reg.register(ChatMode::Custom(0x140), scripted("again", &calls)),
            Err(ModeError::AlreadyRegistered(_))
        ));
        assert!(reg.is_registered(ChatMode::Custom(0x140)));
        assert!(reg.switch_to(&f.ctx, ChatMode::try_from(0x140).unwrap()).unwrap());
        assert_eq!(reg.active(), Some(custom));
    }

    #[test]
    fn unknown_mode_does_not_change_active() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);
        reg.switch_to(&f.ctx, ChatMode::Wakeup).unwrap();
        calls.take();

        let err = reg.switch_to(&f.ctx, ChatMode::Custom(0x200)).unwrap_err();
        assert!(matches!(err, ModeError::NotRegistered(_)));
        assert_eq!(reg.active(), Some(ChatMode::Wakeup));
        assert!(calls.take().is_empty());
    }

    // ---- Switching -----------------------------------------------------------

    #[test]
    fn switch_to_active_mode_is_a_noop() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);
        assert!(reg.switch_to(&f.ctx, ChatMode::Free).unwrap());
        calls.take();

        assert!(!reg.switch_to(&f.ctx, ChatMode::Free).unwrap());
        assert!(calls.take().is_empty());
    }

    #[test]
    fn switch_publishes_mode_switch() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);
        reg.switch_to(&f.ctx, ChatMode::OneShot).unwrap();
        assert!(f
            .events
            .lock()
            .unwrap()
            .contains(&Event::ModeSwitch(ChatMode::OneShot)));
    }

    #[test]
    fn next_cycles_through_registration_order() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = four(&calls);

        assert_eq!(reg.switch_to_next(&f.ctx).unwrap(), ChatMode::Hold);
        let start = reg.active().unwrap();
        let visited: Vec<_> = (0..4).map(|_| reg.switch_to_next(&f.ctx).unwrap()).collect();
        assert_eq!(
            visited,
            vec![ChatMode::OneShot, ChatMode::Wakeup, ChatMode::Free, ChatMode::Hold]
        );
        assert_eq!(reg.active(), Some(start));
    }

    #[test]
    fn next_on_empty_registry_returns_default() {
        let f = fixture();
        let mut reg = ModeRegistry::new();
        assert_eq!(reg.switch_to_next(&f.ctx).unwrap(), ChatMode::default());
        assert_eq!(reg.active(), None);
        assert!(f.events.lock().unwrap().is_empty());
    }

    // ---- Failure paths -------------------------------------------------------

    #[test]
    fn init_failure_leaves_no_mode_active() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = ModeRegistry::new();
        reg.register(ChatMode::Hold, scripted("hold", &calls)).unwrap();
        reg.register(
            ChatMode::Free,
            Box::new(Scripted {
                name: "free",
                calls: Arc::clone(&calls),
                fail_init: true,
                fail_deinit: false,
            }),
        )
        .unwrap();
        reg.switch_to(&f.ctx, ChatMode::Hold).unwrap();
        calls.take();

        let err = reg.switch_to(&f.ctx, ChatMode::Free).unwrap_err();
        assert!(matches!(err, ModeError::Init { .. }));
        assert_eq!(reg.active(), None);
        assert_eq!(reg.state(), ModeState::Invalid);
        assert_eq!(calls.take(), vec!["deinit hold", "init free"]);

        // retry with a working mode succeeds
        assert!(reg.switch_to(&f.ctx, ChatMode::Hold).unwrap());
        assert_eq!(calls.take(), vec!["init hold"]);
    }

    #[test]
    fn deinit_failure_does_not_block_switch() {
        let f = fixture();
        let calls = Arc::new(Calls::default());
        let mut reg = ModeRegistry::new();
        reg.register(
            ChatMode::Hold,
            Box::new(Scripted {
                name: "hold",
                calls: Arc::clone(&calls),
                fail_init: false,
                fail_deinit: true,
            }),
        )
        .unwrap();
        reg.register(ChatMode::Wakeup, scripted("wakeup", &calls)).unwrap();
        reg.switch_to(&f.ctx, ChatMode::Hold).unwrap();

        assert!(reg.switch_to(&f.ctx, ChatMode::Wakeup).unwrap());
        assert_eq!(reg.active(), Some(ChatMode::Wakeup));
    }

    #[test]
    fn state_without_active_mode_is_invalid() {
        let reg = ModeRegistry::new();
        assert_eq!(reg.state(), ModeState::Invalid);
    }
}
