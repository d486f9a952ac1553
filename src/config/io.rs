use std::path::{Path, PathBuf};

use crate::app_dirs;

use super::errors::ConfigError;
use super::types::AppConfig;

/// File name inside the `.mltrain` folder.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `config.toml` inside the app folder. The folder is created if missing.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

pub fn load_or_default() -> Result<AppConfig, ConfigError> {
    load_from_path(&config_path()?)
}

/// Load and normalize `path`. A missing file yields the defaults.
pub fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}; using defaults", path.display());
        return Ok(AppConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(ConfigError::io("read", path))?;
    let parsed: AppConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parsed.normalized())
}

/// Write `config` as pretty TOML, creating parent folders first.
pub fn save_to_path(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(ConfigError::io("create directory", parent))?;
    }
    let text = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(ConfigError::io("write", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }

    #[test]
    fn saves_and_reloads_cluster_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.toml");
        let mut config = AppConfig::default();
        config.cluster.endpoint = "https://search.example:9200".into();
        config.cluster.username = Some("admin".into());
        config.training.async_training = true;
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.cluster.endpoint, "https://search.example:9200");
        assert_eq!(loaded.cluster.username.as_deref(), Some("admin"));
        assert!(loaded.training.async_training);
    }

    #[test]
    fn partial_file_keeps_other_defaults_and_clamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        let data = r#"
[training]
default_algorithm = "Linear_Regression"
poll_interval_ms = 5

[upload]
max_file_bytes = 1024
"#;
        std::fs::write(&path, data).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert_eq!(loaded.training.default_algorithm, "linear_regression");
        assert_eq!(loaded.training.poll_interval_ms, 100);
        assert_eq!(loaded.upload.max_file_bytes, 1024);
        assert_eq!(loaded.cluster, crate::config::ClusterSettings::default());
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "[training\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains("cfg.toml"));
    }

    #[test]
    fn save_reports_the_blocked_directory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let err = save_to_path(&AppConfig::default(), &blocker.join("cfg.toml")).unwrap_err();
        match &err {
            ConfigError::Io { action, path, .. } => {
                assert_eq!(*action, "create directory");
                assert_eq!(path, &blocker);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
        assert!(err.to_string().starts_with("Failed to create directory"));
    }

    #[test]
    fn config_path_lives_under_app_root() {
        let dir = tempdir().unwrap();
        let _guard = app_dirs::ConfigBaseGuard::set(dir.path().to_path_buf());
        let path = config_path().unwrap();
        assert_eq!(
            path,
            dir.path().join(app_dirs::APP_DIR_NAME).join(CONFIG_FILE_NAME)
        );
    }
}
