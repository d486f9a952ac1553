use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::defaults::*;
use super::errors::ConfigError;

/// Settings persisted in `config.toml`.
///
/// Every section is optional on disk; missing keys fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl AppConfig {
    /// Clamp out-of-range values and tidy free-form strings.
    pub fn normalized(mut self) -> Self {
        let endpoint = self.cluster.endpoint.trim().trim_end_matches('/');
        self.cluster.endpoint = if endpoint.is_empty() {
            default_endpoint()
        } else {
            endpoint.to_string()
        };
        self.cluster.username = non_empty(self.cluster.username.take());
        self.cluster.password = non_empty(self.cluster.password.take());
        self.cluster.max_response_bytes = self.cluster.max_response_bytes.max(1024);

        let algorithm = self.training.default_algorithm.trim();
        self.training.default_algorithm = if algorithm.is_empty() {
            default_algorithm()
        } else {
            algorithm.to_ascii_lowercase()
        };
        self.training.poll_interval_ms = self.training.poll_interval_ms.max(MIN_POLL_INTERVAL_MS);
        self.training.max_poll_attempts = self.training.max_poll_attempts.max(1);
        self.training.query_size = self.training.query_size.clamp(1, MAX_QUERY_SIZE);
        self.training.preview_size = self.training.preview_size.clamp(1, MAX_PREVIEW_SIZE);

        self.upload.max_file_bytes = self.upload.max_file_bytes.max(1);

        self.http.connect_timeout_secs = self.http.connect_timeout_secs.max(1);
        self.http.read_timeout_secs = self.http.read_timeout_secs.max(1);
        self.http.write_timeout_secs = self.http.write_timeout_secs.max(1);
        self.http.retry_attempts = self.http.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS);
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// Where the search cluster lives and how to authenticate against it.
///
/// Config keys: `endpoint`, `username`, `password`, `max_response_bytes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Upper bound on any response body read from the cluster.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl ClusterSettings {
    /// Parse the endpoint, requiring an http(s) base URL.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }
        Ok(url)
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            username: None,
            password: None,
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

/// Training submission preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Algorithm selected when a session starts.
    #[serde(default = "default_algorithm")]
    pub default_algorithm: String,
    /// Ask the cluster to train asynchronously and poll the returned task.
    #[serde(default = "default_false")]
    pub async_training: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// `size` sent with query-mode training input.
    #[serde(default = "default_query_size")]
    pub query_size: usize,
    /// Number of hits fetched for a query preview table.
    #[serde(default = "default_preview_size")]
    pub preview_size: usize,
}

impl TrainingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            default_algorithm: default_algorithm(),
            async_training: false,
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            query_size: default_query_size(),
            preview_size: default_preview_size(),
        }
    }
}

/// Limits applied to uploaded training files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Timeouts and retry policy for the shared HTTP agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Attempts for idempotent requests, including the first try.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_endpoint_and_blank_credentials() {
        let mut config = AppConfig::default();
        config.cluster.endpoint = " https://search.local:9200/ ".into();
        config.cluster.username = Some("  ".into());
        let config = config.normalized();
        assert_eq!(config.cluster.endpoint, "https://search.local:9200");
        assert_eq!(config.cluster.username, None);
    }

    #[test]
    fn clamps_training_limits() {
        let mut config = AppConfig::default();
        config.training.poll_interval_ms = 1;
        config.training.max_poll_attempts = 0;
        config.training.query_size = 1_000_000;
        config.http.retry_attempts = 0;
        let config = config.normalized();
        assert_eq!(config.training.poll_interval_ms, MIN_POLL_INTERVAL_MS);
        assert_eq!(config.training.max_poll_attempts, 1);
        assert_eq!(config.training.query_size, MAX_QUERY_SIZE);
        assert_eq!(config.http.retry_attempts, 1);
    }

    #[test]
    fn endpoint_url_rejects_non_http_schemes() {
        let settings = ClusterSettings {
            endpoint: "ftp://example.com".into(),
            ..ClusterSettings::default()
        };
        assert!(settings.endpoint_url().is_err());
        assert!(ClusterSettings::default().endpoint_url().is_ok());
    }
}
