//! Application entry point for the desktop voice chat core.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (first run writes the defaults out).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the event bus, the speaker players, the playback arbiter and
//!    the alert source.
//! 5. Open the cpal input device and the capture pipeline.
//! 6. Register the four modes, restore the persisted mode and volume and
//!    start the 20 ms poll task.
//! 7. Spawn the hotkey listener thread and the agent slice pump.
//! 8. Block until Ctrl-C, then shut down in reverse order.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use voice_chat_core::{
    agent::{pump_slices, LogTransport},
    audio::{
        AudioDevice, CaptureControl, CpalDevice, EnergyVad, Recorder, SliceCallback, VoiceDetector,
    },
    config::{AppConfig, AppPaths, AudioConfig, FileStore, KvStore, PlaybackConfig, STATE_KEY},
    event::EventBus,
    hotkey::{self, parse_key, HotkeyEvent, HotkeyListener},
    mode::{
        ChatMode, FreeMode, HoldMode, ModeContext, ModeEngine, ModeRegistry, OneShotMode,
        WakeupMode,
    },
    playback::{AlertSource, CpalPlayer, PlaybackArbiter, Player, SimulatedPlayer},
    ui::LogDisplay,
};

/// Capture slices buffered between the slice thread and the agent pump.
const SLICE_QUEUE: usize = 64;

// ---------------------------------------------------------------------------
// Alert source (compile-time strategy)
// ---------------------------------------------------------------------------

#[cfg(feature = "alert-callback")]
fn alert_source(_config: &PlaybackConfig) -> Arc<dyn AlertSource> {
    use voice_chat_core::playback::CallbackAlerts;
    Arc::new(CallbackAlerts::new(|alert| {
        log::info!("alert: {}", alert.name())
    }))
}

#[cfg(all(feature = "alert-cloud", not(feature = "alert-callback")))]
fn alert_source(config: &PlaybackConfig) -> Arc<dyn AlertSource> {
    use voice_chat_core::playback::CloudAlerts;
    Arc::new(CloudAlerts::from_config(config))
}

#[cfg(not(any(feature = "alert-cloud", feature = "alert-callback")))]
fn alert_source(_config: &PlaybackConfig) -> Arc<dyn AlertSource> {
    use voice_chat_core::playback::EmbeddedAlerts;
    Arc::new(EmbeddedAlerts)
}

/// A speaker player, or a silent one when no output device is usable.
fn output_player(config: &AudioConfig, label: &str) -> Arc<dyn Player> {
    match CpalPlayer::new(config, label) {
        Ok(player) => Arc::new(player),
        Err(e) => {
            log::warn!("playback: {label} output unavailable ({e}); running silent");
            Arc::new(SimulatedPlayer::auto_complete())
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice chat core starting up");

    // 2. Configuration
    let config = if AppConfig::is_first_run() {
        let config = AppConfig::default();
        if let Err(e) = config.save() {
            log::warn!("config: could not write default settings: {e:#}");
        }
        config
    } else {
        AppConfig::load().unwrap_or_else(|e| {
            log::warn!("config: {e:#}; using defaults");
            AppConfig::default()
        })
    };
    let paths = AppPaths::new();

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Bus, store and playback
    let bus = Arc::new(EventBus::new());
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(paths.store_dir.clone()));
    let player = PlaybackArbiter::new(
        output_player(&config.audio, "foreground"),
        output_player(&config.audio, "background"),
        alert_source(&config.playback),
        Arc::clone(&bus),
    );
    if store.get(STATE_KEY).is_none() {
        player.set_volume(config.playback.default_volume);
    }

    // 5. Capture
    let device = CpalDevice::new(&config.audio).context("no usable capture device")?;
    let detector: Arc<dyn VoiceDetector> = Arc::new(EnergyVad::new(
        device.info(),
        config.audio.vad_threshold,
        config.vad.active_ms,
        config.vad.off_ms,
    ));
    let (slice_tx, slice_rx) = mpsc::channel::<Vec<u8>>(SLICE_QUEUE);
    let output: SliceCallback = Arc::new(move |slice: &[u8]| {
        if slice_tx.try_send(slice.to_vec()).is_err() {
            log::warn!("capture: agent queue full, dropping slice");
        }
    });
    let recorder = Arc::new(
        Recorder::init(&config.vad, &device, Some(detector), Arc::clone(&bus), output)
            .context("failed to start the capture pipeline")?,
    );
    log::info!(
        "capture: {:?}, {} B slices",
        recorder.format(),
        recorder.slice_size()
    );

    // 6. Modes
    let ctx = ModeContext {
        bus: Arc::clone(&bus),
        capture: recorder.clone(),
        player: Arc::clone(&player),
        ui: Arc::new(LogDisplay),
        store,
        settings: config.mode.settings(),
    };
    let mut registry = ModeRegistry::new();
    registry.register(ChatMode::Hold, Box::new(HoldMode::new(&ctx.settings)))?;
    registry.register(ChatMode::OneShot, Box::new(OneShotMode::new(&ctx.settings)))?;
    registry.register(ChatMode::Wakeup, Box::new(WakeupMode::new(&ctx.settings)))?;
    registry.register(ChatMode::Free, Box::new(FreeMode::new(&ctx.settings)))?;

    let engine = ModeEngine::new(ctx, registry);
    engine.set_observer(|event| log::trace!("observer: {}", event.name()));
    let mode = engine
        .restore_state(config.mode.default_mode)
        .context("failed to activate a mode")?;
    log::info!("active mode: {mode}");
    engine.spawn_poll(config.mode.poll_interval())?;

    // 7. Hotkeys and agent pump
    let (hotkey_tx, mut hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);
    let talk_key = parse_key(&config.hotkey.talk_key).unwrap_or(rdev::Key::F9);
    let mode_key = parse_key(&config.hotkey.mode_key).unwrap_or(rdev::Key::F10);
    let _hotkey_listener = match HotkeyListener::start(talk_key, mode_key, hotkey_tx) {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("Hotkeys unavailable: {e}");
            None
        }
    };

    {
        let engine = Arc::clone(&engine);
        rt.spawn(async move {
            while let Some(event) = hotkey_rx.recv().await {
                let engine = Arc::clone(&engine);
                // engine calls wait on the bus; keep them off the async workers
                if let Err(e) =
                    tokio::task::spawn_blocking(move || hotkey::apply(event, &engine)).await
                {
                    log::error!("hotkey task panicked: {e}");
                }
            }
        });
    }
    rt.spawn(pump_slices(slice_rx, Arc::new(LogTransport)));

    // 8. Run until Ctrl-C
    rt.block_on(tokio::signal::ctrl_c())
        .context("failed to wait for Ctrl-C")?;
    log::info!("shutting down");

    if let Err(e) = engine.shutdown() {
        log::warn!("engine shutdown: {e}");
    }
    if let Err(e) = recorder.stop() {
        log::warn!("capture shutdown: {e}");
    }
    player.deinit();
    // the hotkey task and the slice pump never finish on their own
    rt.shutdown_timeout(Duration::from_millis(500));
    Ok(())
}
