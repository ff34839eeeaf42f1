//! UI boundary.
//!
//! The core only ever calls [`UiDisplay::display`] and never waits for the UI.
//! The desktop binary renders to the log.

/// What a display payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayKind {
    /// Conversation state label ("listening", "thinking", …).
    State,
    /// Active mode name.
    Mode,
    /// Recognised user speech.
    UserText,
    /// Streamed assistant text.
    AiText,
    Emotion,
    /// Free-form notification.
    Notice,
}

/// Fire-and-forget display sink.
pub trait UiDisplay: Send + Sync {
    fn display(&self, kind: DisplayKind, data: &[u8]);
}

/// Writes every display call to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl UiDisplay for LogDisplay {
    fn display(&self, kind: DisplayKind, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        match kind {
            DisplayKind::State => log::info!("ui: [{text}]"),
            DisplayKind::Mode => log::info!("ui: mode {text}"),
            DisplayKind::UserText => log::info!("ui: you> {text}"),
            DisplayKind::AiText => log::info!("ui: ai> {text}"),
            DisplayKind::Emotion => log::info!("ui: emotion {text}"),
            DisplayKind::Notice => log::info!("ui: {text}"),
        }
    }
}
