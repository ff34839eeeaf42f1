//! Where settings and persisted state live.
//!
//! ```text
//! settings.toml   <config dir>/voice-chat-core/settings.toml
//! key store       <local data dir>/voice-chat-core/store/<key>
//! ```
//!
//! `<config dir>` and `<local data dir>` come from `dirs`
//! (`~/.config` and `~/.local/share` on Linux, `%APPDATA%` and
//! `%LOCALAPPDATA%` on Windows, `~/Library/Application Support` on macOS).

use std::path::{Path, PathBuf};

const APP_DIR: &str = "voice-chat-core";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// One file per key, see [`FileStore`](super::FileStore).
    pub store_dir: PathBuf,
}

impl AppPaths {
    /// Platform locations, or the working directory where the platform has
    /// none.
    pub fn new() -> Self {
        let cwd = || PathBuf::from(".");
        Self::rooted(
            &dirs::config_dir().unwrap_or_else(cwd),
            &dirs::data_local_dir().unwrap_or_else(cwd),
        )
    }

    /// Lay the application directories out under explicit roots.
    pub fn rooted(config_root: &Path, data_root: &Path) -> Self {
        let config_dir = config_root.join(APP_DIR);
        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            store_dir: data_root.join(APP_DIR).join("store"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_roots() {
        let paths = AppPaths::rooted(Path::new("/cfg"), Path::new("/data"));
        assert_eq!(paths.config_dir, Path::new("/cfg/voice-chat-core"));
        assert_eq!(
            paths.settings_file,
            Path::new("/cfg/voice-chat-core/settings.toml")
        );
        assert_eq!(paths.store_dir, Path::new("/data/voice-chat-core/store"));
    }

    #[test]
    fn platform_paths_end_in_app_dir() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert!(paths.store_dir.ends_with("voice-chat-core/store"));
    }
}
