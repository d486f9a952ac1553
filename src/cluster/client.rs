//! HTTP client for the search cluster REST API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{AppConfig, ConfigError};
use crate::http_client::{self, RetryConfig};

/// Failures talking to the cluster, before any business-level interpretation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Cluster rejected the credentials")]
    Unauthorized,
    #[error("Cluster returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Worth retrying for idempotent requests.
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// REST client bound to one cluster endpoint.
#[derive(Clone)]
pub struct ClusterClient {
    base: Url,
    authorization: Option<String>,
    agent: ureq::Agent,
    max_response_bytes: usize,
    retry: RetryConfig,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.authorization.is_some())
            .finish()
    }
}

impl ClusterClient {
    /// Build a client from `[cluster]` and `[http]`; fails on a bad endpoint.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let base = config.cluster.endpoint_url()?;
        let authorization = config.cluster.username.as_ref().map(|user| {
            let password = config.cluster.password.as_deref().unwrap_or("");
            format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
        });
        Ok(Self {
            base,
            authorization,
            agent: http_client::build_agent(&config.http),
            max_response_bytes: config.cluster.max_response_bytes,
            retry: RetryConfig::for_reads(&config.http),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    /// Join path segments onto the endpoint, keeping any base path prefix.
    pub(super) fn url_for(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET a JSON document, retrying transient failures.
    pub(super) fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, TransportError> {
        http_client::retry_with_backoff(
            self.retry,
            || {
                let request = self.request("GET", url);
                self.finish(request.call())
            },
            TransportError::is_transient,
        )
        .and_then(|body| parse_json(&body))
    }

    /// POST a JSON body once. Non-2xx responses are returned as [`TransportError::Status`].
    pub(super) fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &Url,
        body: &B,
    ) -> Result<T, TransportError> {
        let request = self.request("POST", url);
        let body = self.finish(request.send_json(body))?;
        parse_json(&body)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let request = self
            .agent
            .request_url(method, url)
            .set("Accept", "application/json");
        match &self.authorization {
            Some(value) => request.set("Authorization", value),
            None => request,
        }
    }

    fn finish(
        &self,
        result: Result<ureq::Response, ureq::Error>,
    ) -> Result<String, TransportError> {
        match result {
            Ok(response) => self.read_body(response).map_err(TransportError::InvalidResponse),
            Err(ureq::Error::Status(401 | 403, _)) => Err(TransportError::Unauthorized),
            Err(ureq::Error::Status(code, response)) => {
                let body = self.read_body(response).unwrap_or_else(|err| err);
                Err(TransportError::Status { code, body })
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError::Transport(err.to_string())),
        }
    }

    fn read_body(&self, response: ureq::Response) -> Result<String, String> {
        let bytes = http_client::read_response_bytes(response, self.max_response_bytes)
            .map_err(|err| err.to_string())?;
        String::from_utf8(bytes).map_err(|err| err.to_string())
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(TransportError::InvalidResponse("Empty response body".into()));
    }
    serde_json::from_str(trimmed)
        .map_err(|err| TransportError::InvalidResponse(format!("{err}: {trimmed}")))
}

/// Pull the human-readable reason out of a cluster error body.
pub(super) fn error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let error = value.get("error")?;
    if let Some(reason) = error.get("reason").and_then(|reason| reason.as_str()) {
        return Some(reason.to_string());
    }
    error.as_str().map(str::to_string)
}
