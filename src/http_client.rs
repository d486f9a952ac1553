//! HTTP agent construction, capped body reads and retry policy for cluster calls.

use std::io::{self, Read};
use std::time::Duration;

use thiserror::Error;

use crate::config::HttpSettings;

const READ_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const READ_RETRY_MAX_DELAY: Duration = Duration::from_secs(4);

/// Exponential backoff for idempotent requests.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    pub(crate) fn for_reads(settings: &HttpSettings) -> Self {
        Self {
            max_attempts: settings.retry_attempts,
            base_delay: READ_RETRY_BASE_DELAY,
            max_delay: READ_RETRY_MAX_DELAY,
        }
    }

    /// Delay before attempt `attempt + 1`: base doubled per earlier failure, capped.
    fn delay_after(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        1u32.checked_shl(doublings)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// The response body is larger than the configured cap.
#[derive(Debug, Error)]
pub(crate) enum BodyError {
    #[error("Response declares {declared} bytes; the limit is {limit}")]
    DeclaredTooLarge { declared: u64, limit: usize },
    #[error("Response exceeded {limit} bytes")]
    TooLarge { limit: usize },
    #[error("Failed to read response body: {0}")]
    Io(#[from] io::Error),
}

pub(crate) fn build_agent(settings: &HttpSettings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(settings.connect_timeout())
        .timeout_read(settings.read_timeout())
        .timeout_write(settings.write_timeout())
        .build()
}

/// Run `action` until it succeeds, `should_retry` rejects the error, or attempts run out.
pub(crate) fn retry_with_backoff<T, E, F, R>(
    config: RetryConfig,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: FnMut(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1usize;
    loop {
        match action() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < config.max_attempts && should_retry(&err) => {
                let delay = config.delay_after(attempt);
                tracing::debug!("Attempt {attempt} failed ({err}); retrying in {delay:?}");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Read a whole response body, refusing anything over `limit` bytes.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    limit: usize,
) -> Result<Vec<u8>, BodyError> {
    let declared = response
        .header("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok());
    if let Some(declared) = declared.filter(|&declared| declared > limit as u64) {
        return Err(BodyError::DeclaredTooLarge { declared, limit });
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(BodyError::TooLarge { limit });
    }
    Ok(bytes)
}
