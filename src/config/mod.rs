//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and the key-value store that keeps
//! the runtime state (volume, chat mode) between runs.

pub mod paths;
pub mod settings;
pub mod store;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, HotkeyConfig, ModeConfig, PlaybackConfig, VadConfig};
pub use store::{FileStore, KvStore, MemoryStore, PersistedState, StoreError, STATE_KEY};
