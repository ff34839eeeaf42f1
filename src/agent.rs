//! Cloud agent boundary.
//!
//! Outbound: capture slices and user content go through an
//! [`AgentTransport`].  Inbound: whatever the agent sends back is turned into
//! an [`Inbound`] message and handed to [`route_inbound`], which feeds TTS
//! stream phases to the arbiter and everything else onto the event bus.
//!
//! ```text
//!  Recorder ──slice──▶ mpsc ──▶ pump_slices ──▶ AgentTransport::send_audio
//!
//!  agent ──▶ Inbound ──▶ route_inbound ─┬─ Tts* ──▶ PlaybackArbiter::play_tts_stream
//!                                       └─ rest ──▶ EventBus::publish
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::{Event, EventBus, Skill};
use crate::playback::{Codec, PlayControl, PlaybackArbiter, PlaybackError, TtsPhase};

// ---------------------------------------------------------------------------
// AgentError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AgentError {
    /// The transport failed to deliver.
    #[error("agent transport failed: {0}")]
    Transport(String),

    /// The connection to the agent is gone.
    #[error("agent connection closed")]
    Closed,

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

// ---------------------------------------------------------------------------
// AgentTransport
// ---------------------------------------------------------------------------

/// Outbound half of the agent connection.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn AgentTransport>`).
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// One capture slice of PCM audio.
    async fn send_audio(&self, slice: &[u8]) -> Result<(), AgentError>;
    async fn send_text(&self, text: &str) -> Result<(), AgentError>;
    async fn send_file(&self, name: &str, data: &[u8]) -> Result<(), AgentError>;
    async fn send_image(&self, data: &[u8]) -> Result<(), AgentError>;
}

/// Logs what would be sent.  Used when no agent is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl AgentTransport for LogTransport {
    async fn send_audio(&self, slice: &[u8]) -> Result<(), AgentError> {
        log::trace!("agent: audio slice ({} bytes)", slice.len());
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), AgentError> {
        log::info!("agent: text {text:?}");
        Ok(())
    }

    async fn send_file(&self, name: &str, data: &[u8]) -> Result<(), AgentError> {
        log::info!("agent: file {name} ({} bytes)", data.len());
        Ok(())
    }

    async fn send_image(&self, data: &[u8]) -> Result<(), AgentError> {
        log::info!("agent: image ({} bytes)", data.len());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A message received from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    AsrOk(String),
    AsrEmpty,
    AsrError(String),
    TtsStart(Codec),
    TtsData(Vec<u8>),
    TtsStop,
    TtsAbort,
    TtsError(String),
    TextStart,
    TextData(String),
    TextEnd,
    Emotion(String),
    Skill(Skill),
    PlayCtl(PlayControl),
    Connected,
    Disconnected,
}

/// Deliver one inbound message.
///
/// # Errors
///
/// Only TTS phases can fail, with the arbiter's error.  The failure of a
/// data chunk does not close the stream.
pub fn route_inbound(
    message: Inbound,
    player: &PlaybackArbiter,
    bus: &EventBus,
) -> Result<(), AgentError> {
    let event = match message {
        Inbound::TtsStart(codec) => return Ok(player.play_tts_stream(TtsPhase::Start(codec))?),
        Inbound::TtsData(data) => return Ok(player.play_tts_stream(TtsPhase::Data(&data))?),
        Inbound::TtsStop => return Ok(player.play_tts_stream(TtsPhase::Stop)?),
        Inbound::TtsAbort => return Ok(player.play_tts_stream(TtsPhase::Abort)?),
        Inbound::TtsError(reason) => {
            log::warn!("agent: tts error: {reason}");
            bus.publish(Event::TtsError(reason));
            return Ok(player.play_tts_stream(TtsPhase::Abort)?);
        }
        Inbound::AsrOk(text) => Event::AsrOk(text),
        Inbound::AsrEmpty => Event::AsrEmpty,
        Inbound::AsrError(reason) => Event::AsrError(reason),
        Inbound::TextStart => Event::TextStart,
        Inbound::TextData(text) => Event::TextData(text),
        Inbound::TextEnd => Event::TextEnd,
        Inbound::Emotion(emotion) => Event::Emotion(emotion),
        Inbound::Skill(skill) => Event::Skill(skill),
        Inbound::PlayCtl(control) => Event::PlayCtl(control),
        Inbound::Connected => Event::ClientConnected,
        Inbound::Disconnected => Event::ClientDisconnected,
    };
    bus.publish(event);
    Ok(())
}

// ---------------------------------------------------------------------------
// Slice pump
// ---------------------------------------------------------------------------

/// Forward capture slices to the agent until the channel closes.
///
/// A failed send is logged and the slice dropped; [`AgentError::Closed`]
/// ends the pump.  Returns the number of slices delivered.
pub async fn pump_slices(
    mut slices: mpsc::Receiver<Vec<u8>>,
    transport: Arc<dyn AgentTransport>,
) -> usize {
    let mut sent = 0;
    while let Some(slice) = slices.recv().await {
        match transport.send_audio(&slice).await {
            Ok(()) => sent += 1,
            Err(AgentError::Closed) => {
                log::warn!("agent: connection closed, stopping slice pump");
                break;
            }
            Err(e) => log::warn!("agent: dropping slice: {e}"),
        }
    }
    log::debug!("agent: slice pump finished after {sent} slices");
    sent
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
