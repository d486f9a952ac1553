//! Where mltrain keeps its files: one `.mltrain` folder under the OS config root.
//!
//! `MLTRAIN_CONFIG_HOME` replaces the OS config root, which lets tests and
//! portable installs keep everything in a directory of their choosing.

use std::{
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

/// Folder created under the config root.
pub const APP_DIR_NAME: &str = ".mltrain";
/// Overrides the config root when set.
pub const CONFIG_HOME_ENV: &str = "MLTRAIN_CONFIG_HOME";
const LOGS_DIR_NAME: &str = "logs";

static CONFIG_BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("Could not determine a config directory for mltrain files")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The `.mltrain` folder, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = config_base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// `.mltrain/logs`, created on first use.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join(LOGS_DIR_NAME))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    match std::fs::create_dir_all(&path) {
        Ok(()) => Ok(path),
        Err(source) => Err(AppDirError::CreateDir { path, source }),
    }
}

/// Pinned override first, then the environment, then the platform default.
fn config_base_dir() -> Option<PathBuf> {
    let pinned = CONFIG_BASE_OVERRIDE
        .lock()
        .ok()
        .and_then(|slot| slot.clone());
    pinned
        .or_else(|| std::env::var_os(CONFIG_HOME_ENV).map(PathBuf::from))
        .or_else(|| BaseDirs::new().map(|dirs| Path::to_path_buf(dirs.config_dir())))
}

/// Pins the config root for one unit test and keeps other pinning tests waiting.
#[cfg(test)]
pub(crate) struct ConfigBaseGuard {
    _serial: std::sync::MutexGuard<'static, ()>,
}

#[cfg(test)]
static PIN_SERIAL: Mutex<()> = Mutex::new(());

#[cfg(test)]
impl ConfigBaseGuard {
    pub(crate) fn set(path: PathBuf) -> Self {
        let serial = PIN_SERIAL.lock().unwrap_or_else(|err| err.into_inner());
        *CONFIG_BASE_OVERRIDE
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = Some(path);
        Self { _serial: serial }
    }
}

#[cfg(test)]
impl Drop for ConfigBaseGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = CONFIG_BASE_OVERRIDE.lock() {
            slot.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pinned_base_hosts_the_app_folder() {
        let base = tempdir().unwrap();
        let _pin = ConfigBaseGuard::set(base.path().to_path_buf());
        let root = app_root_dir().unwrap();
        assert_eq!(root, base.path().join(".mltrain"));
        assert!(root.is_dir());
    }

    #[test]
    fn logs_live_inside_the_app_folder() {
        let base = tempdir().unwrap();
        let _pin = ConfigBaseGuard::set(base.path().to_path_buf());
        let logs = logs_dir().unwrap();
        assert_eq!(logs, base.path().join(".mltrain").join("logs"));
        assert!(logs.is_dir());
    }

    #[test]
    fn blocked_path_reports_the_directory() {
        let base = tempdir().unwrap();
        let blocker = base.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let _pin = ConfigBaseGuard::set(blocker.clone());
        match app_root_dir() {
            Err(AppDirError::CreateDir { path, .. }) => {
                assert_eq!(path, blocker.join(".mltrain"));
            }
            other => panic!("expected CreateDir, got {other:?}"),
        }
    }
}
