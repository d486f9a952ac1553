//! Logging setup for the training console.
//!
//! Installs a global tracing subscriber that writes to stderr and to a
//! per-launch log file. Stdout stays free for command output. Files are
//! timestamped and only the newest few are kept.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::app_dirs::{self, AppDirError};

/// Launch logs kept on disk after pruning.
const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "mltrain";
const LOG_FILE_EXTENSION: &str = ".log";
const QUIET_FILTER: &str = "info";
const VERBOSE_FILTER: &str = "mltrain=debug,info";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Why logging could not be started.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Log directory unavailable: {0}")]
    Directory(#[from] AppDirError),
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    #[error("Failed to format log filename time: {0}")]
    FormatTime(#[from] time::error::Format),
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

impl LoggingError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The file this launch writes to.
struct LaunchLog {
    dir: PathBuf,
    file_name: String,
}

impl LaunchLog {
    fn at(dir: PathBuf, started: OffsetDateTime) -> Result<Self, LoggingError> {
        const NAME_FORMAT: &[FormatItem<'_>] =
            format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
        let stamp = started.format(NAME_FORMAT)?;
        Ok(Self {
            dir,
            file_name: format!("{LOG_FILE_PREFIX}_{stamp}{LOG_FILE_EXTENSION}"),
        })
    }

    fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Create the file up front so pruning counts it among the newest.
    fn touch(&self) -> Result<(), LoggingError> {
        touch(&self.path())
    }
}

/// Initialize tracing to write to stderr and a per-launch log file.
///
/// `verbose` lowers the filter to `debug` for this crate unless `RUST_LOG`
/// is set. Later calls do nothing. Errors are returned so the caller can
/// carry on without file logs.
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let launch = LaunchLog::at(app_dirs::logs_dir()?, now_local_or_utc())?;
    launch.touch()?;
    prune_old_logs(&launch.dir, MAX_LOG_FILES)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(rolling::never(&launch.dir, &launch.file_name));
    let timer = build_timer();
    let console_layer = fmt::layer()
        .with_target(false)
        .with_timer(timer.clone())
        .with_writer(io::stderr);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_timer(timer)
        .with_writer(file_writer);

    tracing::subscriber::set_global_default(
        Registry::default()
            .with(env_filter(verbose))
            .with(console_layer)
            .with(file_layer),
    )?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("Writing log to {}", launch.path().display());
    Ok(())
}

fn touch(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
        .map_err(LoggingError::io("create log file", path))
}

/// Delete this tool's oldest log files so at most `keep` remain.
///
/// Names embed a sortable launch timestamp, so name order is launch order.
/// Files without the `mltrain` prefix and `.log` extension are left alone.
fn prune_old_logs(dir: &Path, keep: usize) -> Result<(), LoggingError> {
    let mut launches: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(LoggingError::io("read log directory", dir))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_launch_log(path))
        .collect();
    if launches.len() <= keep {
        return Ok(());
    }
    launches.sort();
    let excess = launches.len() - keep;
    for path in &launches[..excess] {
        fs::remove_file(path).map_err(LoggingError::io("remove old log file", path))?;
    }
    Ok(())
}

fn is_launch_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with(LOG_FILE_PREFIX) && name.ends_with(LOG_FILE_EXTENSION)
        })
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { QUIET_FILTER })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn launch_log_name_carries_prefix_and_timestamp() {
        let started = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let launch = LaunchLog::at(PathBuf::from("logs"), started).unwrap();
        assert_eq!(launch.file_name, "mltrain_2023-11-14_22-13-20.log");
        assert_eq!(
            launch.path(),
            Path::new("logs").join("mltrain_2023-11-14_22-13-20.log")
        );
    }

    #[test]
    fn prune_leaves_foreign_files_alone() {
        let dir = tempdir().unwrap();
        for name in ["config.toml", "other_tool.log", "mltrain_2024-01-01_00-00-00.log"] {
            touch(&dir.path().join(name)).unwrap();
        }
        prune_old_logs(dir.path(), 0).unwrap();
        assert!(dir.path().join("config.toml").exists());
        assert!(dir.path().join("other_tool.log").exists());
        assert!(!dir.path().join("mltrain_2024-01-01_00-00-00.log").exists());
    }

    #[test]
    fn prune_keeps_the_newest_launches() {
        let dir = tempdir().unwrap();
        for day in 1..=12 {
            touch(&dir.path().join(format!("mltrain_2024-03-{day:02}_08-00-00.log"))).unwrap();
        }

        prune_old_logs(dir.path(), MAX_LOG_FILES).unwrap();
        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), MAX_LOG_FILES);
        assert_eq!(remaining[0], "mltrain_2024-03-03_08-00-00.log");
    }

    #[test]
    fn io_errors_name_the_action_and_path() {
        let missing = Path::new("/nonexistent/mltrain-logs");
        let err = prune_old_logs(missing, 1).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Failed to read log directory"));
        assert!(message.contains("mltrain-logs"));
    }
}
