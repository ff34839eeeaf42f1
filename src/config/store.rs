//! Key → blob store for runtime state that outlives the process.
//!
//! Only one record is stored today: [`PersistedState`] under [`STATE_KEY`],
//! the flat JSON `{"volume": 70, "chat_mode": 2}` written on every mode
//! switch and volume change.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mode::ChatMode;

/// Key of the persisted [`PersistedState`] record.
pub const STATE_KEY: &str = "chat_state";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key {0:?}")]
    InvalidKey(String),

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Volume and mode restored at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub volume: u8,
    pub chat_mode: ChatMode,
}

pub trait KvStore: Send + Sync {
    /// `None` when the key was never written or cannot be read.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One file per key under a directory.  Writes go through a temporary file
/// and a rename so a crash never leaves a half-written record.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.path(key).ok()?;
        match std::fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("store: reading {} failed: {e}", path.display());
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        log::debug!("store: wrote {key} ({} bytes)", value.len());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trips_and_overwrites() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path().join("store"));

        assert_eq!(store.get(STATE_KEY), None);
        store.set(STATE_KEY, b"one").unwrap();
        store.set(STATE_KEY, b"two").unwrap();
        assert_eq!(store.get(STATE_KEY).as_deref(), Some(&b"two"[..]));
        assert!(!dir.path().join("store").join("chat_state.tmp").exists());
    }

    #[test]
    fn file_store_rejects_path_keys() {
        let dir = tempdir().expect("temp dir");
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.set("../escape", b"x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert_eq!(store.get("../escape"), None);
    }

    #[test]
    fn persisted_state_is_flat_json() {
        let state = PersistedState {
            volume: 70,
            chat_mode: ChatMode::Wakeup,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"volume":70,"chat_mode":2}"#);

        let back: PersistedState =
            serde_json::from_str(r#"{"volume": 55, "chat_mode": 0}"#).unwrap();
        assert_eq!(back.chat_mode, ChatMode::Hold);
        assert_eq!(back.volume, 55);
    }

    #[test]
    fn memory_store_is_independent_per_key() {
        let store = MemoryStore::default();
        store.set("a", b"1").unwrap();
        store.set("b", b"2").unwrap();
        assert_eq!(store.get("a").as_deref(), Some(&b"1"[..]));
        assert_eq!(store.get("c"), None);
    }
}
