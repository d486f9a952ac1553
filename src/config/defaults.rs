pub(super) const DEFAULT_ENDPOINT: &str = "http://localhost:9200";
pub(super) const DEFAULT_ALGORITHM: &str = "kmeans";

pub(super) const MIN_POLL_INTERVAL_MS: u64 = 100;
pub(super) const MAX_QUERY_SIZE: usize = 10_000;
pub(super) const MAX_PREVIEW_SIZE: usize = 1_000;
pub(super) const MAX_RETRY_ATTEMPTS: usize = 10;

pub(super) fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

pub(super) fn default_algorithm() -> String {
    DEFAULT_ALGORITHM.to_string()
}

pub(super) fn default_max_response_bytes() -> usize {
    8 * 1024 * 1024
}

pub(super) fn default_poll_interval_ms() -> u64 {
    3_000
}

pub(super) fn default_max_poll_attempts() -> u32 {
    200
}

pub(super) fn default_query_size() -> usize {
    MAX_QUERY_SIZE
}

pub(super) fn default_preview_size() -> usize {
    20
}

pub(super) fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

pub(super) fn default_connect_timeout_secs() -> u64 {
    10
}

pub(super) fn default_read_timeout_secs() -> u64 {
    120
}

pub(super) fn default_write_timeout_secs() -> u64 {
    30
}

pub(super) fn default_retry_attempts() -> usize {
    3
}

pub(super) fn default_false() -> bool {
    false
}
