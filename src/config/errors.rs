use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::app_dirs::AppDirError;

/// Failures loading, saving or validating `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config directory unavailable: {0}")]
    Directory(#[from] AppDirError),
    /// Reading, writing or creating something at `path` failed.
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    /// The cluster endpoint is not an absolute http(s) URL.
    #[error("Invalid cluster endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
}

impl ConfigError {
    pub(super) fn io<'a>(
        action: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
