//! Application path resolution.
//!
//! - **Working-directory mode**: `config.yaml` in the current directory wins
//!   (typical when running from a checkout).
//! - **Portable mode**: a `.portable` marker next to the executable keeps
//!   every file in the executable's directory.
//! - **Installed mode** (default): the platform config directory from `dirs`
//!   (`%APPDATA%\Joybridge`, `~/.config/joybridge`, ...).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Application name used for directories in installed mode
#[cfg(windows)]
const APP_NAME: &str = "Joybridge";
#[cfg(not(windows))]
const APP_NAME: &str = "joybridge";

/// Config file name looked up in every mode
pub const CONFIG_FILE: &str = "config.yaml";

/// Application paths for config and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Whether all files live next to the config (cwd or portable mode)
    pub is_portable: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Note: This is called before logging is initialized, so nothing is
    /// logged here.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        Self::resolve(&cwd, &exe_dir, dirs::config_dir())
    }

    /// Resolve paths from explicit locations
    fn resolve(cwd: &Path, exe_dir: &Path, config_dir: Option<PathBuf>) -> Self {
        if cwd.join(CONFIG_FILE).exists() {
            return Self::portable(cwd);
        }
        if exe_dir.join(".portable").exists() {
            return Self::portable(exe_dir);
        }

        let base = config_dir
            .unwrap_or_else(|| exe_dir.to_path_buf())
            .join(APP_NAME);
        Self {
            config: base.join(CONFIG_FILE),
            logs_dir: base.join("logs"),
            is_portable: false,
        }
    }

    fn portable(dir: &Path) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            logs_dir: dir.join("logs"),
            is_portable: true,
        }
    }

    /// Ensure the logs directory exists.
    pub fn ensure_logs_dir(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory {}", self.logs_dir.display())
            })?;
        }
        Ok(())
    }
}
