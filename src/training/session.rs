//! The session container: every piece of form state plus the handlers that mutate it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::jobs::{
    DecodeJob, DecodeResult, JobMessage, PreviewResult, SessionJobs, TrainingJob, TrainingUpdate,
};
use super::lifecycle::Lifecycle;
use super::request::{NumericInput, build_request};
use crate::algorithms::{
    AlgorithmId, AlgorithmSpec, ParameterError, ParameterMap, defaults_for, spec_for,
};
use crate::cluster::{QueryApi, SearchRequest, TrainingApi};
use crate::config::{AppConfig, TrainingSettings};
use crate::data_source::{DataSourceMode, FileInfo, QuerySelection, UploadState};
use crate::tabular::{TabularError, TabularTable, extract_input};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Why a query preview could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    #[error("No cluster connection is available for query preview")]
    NoQueryApi,
    #[error("Select at least one field to preview")]
    NoFields,
}

/// One training form: algorithm, parameters, data source and the submission lifecycle.
///
/// Handlers run on the caller's thread. Decodes, previews and submissions run
/// on background threads and report through a channel drained by [`poll`];
/// each carries the generation or request id current when it was issued, and
/// results that no longer match are dropped.
///
/// [`poll`]: TrainingSession::poll
pub struct TrainingSession {
    settings: TrainingSettings,
    max_file_bytes: u64,
    training_api: Arc<dyn TrainingApi>,
    query_api: Option<Arc<dyn QueryApi>>,
    algorithm: AlgorithmId,
    params: ParameterMap,
    mode: DataSourceMode,
    upload: UploadState,
    query: QuerySelection,
    preview: Option<TabularTable>,
    preview_error: Option<String>,
    lifecycle: Lifecycle,
    upload_generation: u64,
    pending_decode: Option<u64>,
    decode_on_upload: bool,
    preview_generation: u64,
    pending_preview: Option<u64>,
    jobs: SessionJobs,
}

impl TrainingSession {
    /// Start an idle session on the configured default algorithm.
    ///
    /// An unknown default is logged and replaced by k-means.
    pub fn new(config: &AppConfig, training_api: Arc<dyn TrainingApi>) -> Self {
        let algorithm = config
            .training
            .default_algorithm
            .parse()
            .unwrap_or_else(|err| {
                warn!("{err}; starting with {}", AlgorithmId::Kmeans);
                AlgorithmId::Kmeans
            });
        Self {
            settings: config.training.clone(),
            max_file_bytes: config.upload.max_file_bytes,
            training_api,
            query_api: None,
            algorithm,
            params: defaults_for(algorithm),
            mode: DataSourceMode::default(),
            upload: UploadState::default(),
            query: QuerySelection::default(),
            preview: None,
            preview_error: None,
            lifecycle: Lifecycle::Idle,
            upload_generation: 0,
            pending_decode: None,
            decode_on_upload: false,
            preview_generation: 0,
            pending_preview: None,
            jobs: SessionJobs::new(),
        }
    }

    /// Enable query mode previews against a live cluster.
    pub fn with_query_api(mut self, query_api: Arc<dyn QueryApi>) -> Self {
        self.query_api = Some(query_api);
        self
    }

    /// Currently selected algorithm.
    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    /// Catalog entry for the selected algorithm.
    pub fn algorithm_spec(&self) -> &'static AlgorithmSpec {
        spec_for(self.algorithm)
    }

    /// Hyperparameters that the next submission will send.
    pub fn params(&self) -> &ParameterMap {
        &self.params
    }

    pub fn mode(&self) -> DataSourceMode {
        self.mode
    }

    /// Chosen files, decoded table and column selection.
    pub fn upload(&self) -> &UploadState {
        &self.upload
    }

    pub fn query_selection(&self) -> &QuerySelection {
        &self.query
    }

    /// Hits from the latest finished preview.
    pub fn preview(&self) -> Option<&TabularTable> {
        self.preview.as_ref()
    }

    pub fn preview_error(&self) -> Option<&str> {
        self.preview_error.as_deref()
    }

    /// State of the most recent submission.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// A decode, preview or submission is still outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending_decode.is_some()
            || self.pending_preview.is_some()
            || self.jobs.active_request_id().is_some()
    }

    /// Switch algorithms. Parameters are always replaced by the new defaults.
    pub fn select_algorithm(&mut self, algorithm: AlgorithmId) {
        if algorithm != self.algorithm {
            self.abandon_submission("algorithm changed");
        }
        self.algorithm = algorithm;
        self.params = defaults_for(algorithm);
        debug!("Selected algorithm {algorithm}");
    }

    /// Parse `raw` against the parameter's declared type and store it.
    pub fn set_param(&mut self, name: &str, raw: &str) -> Result<(), ParameterError> {
        self.params.set_from_str(spec_for(self.algorithm), name, raw)
    }

    /// Switch data source.
    ///
    /// Abandons any submission in flight and clears the column selection. The
    /// decoded table survives; a decode cut short resumes on return to upload.
    pub fn set_mode(&mut self, mode: DataSourceMode) {
        if mode == self.mode {
            return;
        }
        self.abandon_submission("data source changed");
        self.upload.clear_selection();
        if let Some(generation) = self.pending_decode.take() {
            debug!("Abandoning file decode generation {generation} on switch to {mode}");
            self.upload_generation = self.upload_generation.wrapping_add(1);
            self.decode_on_upload = true;
        }
        self.invalidate_preview();
        self.mode = mode;
        if mode == DataSourceMode::Upload && self.decode_on_upload {
            self.decode_on_upload = false;
            self.start_decode();
        }
    }

    pub fn choose_file(&mut self, path: impl Into<PathBuf>) {
        self.choose_files(vec![path.into()]);
    }

    /// Replace the chosen files. Only the first one is decoded.
    pub fn choose_files(&mut self, paths: Vec<PathBuf>) {
        let files = paths.iter().map(|path| FileInfo::from_path(path)).collect();
        self.upload.set_files(files);
        self.upload_generation = self.upload_generation.wrapping_add(1);
        self.pending_decode = None;
        self.decode_on_upload = false;
        if self.mode == DataSourceMode::Upload {
            self.start_decode();
        } else {
            self.decode_on_upload = !self.upload.files().is_empty();
        }
    }

    pub fn clear_files(&mut self) {
        self.choose_files(Vec::new());
    }

    /// Pick the numeric input columns, in order.
    pub fn select_columns(&mut self, columns: Vec<usize>) -> Result<(), TabularError> {
        self.upload.select_columns(columns)
    }

    /// Set the fields chosen for one index pattern; an empty list removes it.
    pub fn set_query_fields(&mut self, index: impl Into<String>, fields: Vec<String>) {
        let index = index.into();
        if fields.is_empty() {
            self.query.fields.remove(&index);
        } else {
            self.query.fields.insert(index, fields);
        }
        self.invalidate_preview();
    }

    /// Replace the query DSL body; `None` matches everything.
    pub fn set_query(&mut self, query: Option<Value>) {
        self.query.query = query;
        self.invalidate_preview();
    }

    /// Fetch a small sample of the query's hits as a table.
    pub fn begin_query_preview(&mut self) -> Result<(), PreviewError> {
        let api = self.query_api.clone().ok_or(PreviewError::NoQueryApi)?;
        if !self.query.has_fields() {
            return Err(PreviewError::NoFields);
        }
        self.invalidate_preview();
        let generation = self.preview_generation;
        self.pending_preview = Some(generation);
        let request = SearchRequest {
            indices: self.query.indices(),
            fields: self.query.all_fields(),
            query: self.query.query.clone(),
            size: self.settings.preview_size,
        };
        self.jobs.begin_preview(api, generation, request);
        Ok(())
    }

    /// Start a new submission. Any earlier submission is abandoned and its
    /// result will be ignored. Returns the new request id.
    pub fn submit(&mut self) -> u64 {
        let request_id = self.jobs.next_request_id();
        if let Some(previous) = self.jobs.abandon_training() {
            debug!("Training request {previous} superseded by {request_id}");
        }
        self.lifecycle = Lifecycle::Submitting;

        let input = match self.mode {
            DataSourceMode::Upload => match self.numeric_input() {
                Ok(input) => input,
                Err(err) => {
                    info!("Training request {request_id} not sent: {err}");
                    self.lifecycle = Lifecycle::failed(err.to_string());
                    return request_id;
                }
            },
            DataSourceMode::Query => NumericInput::default(),
        };
        let payload = match build_request(
            self.algorithm,
            self.mode,
            &self.params,
            &input,
            &self.query,
            self.settings.query_size,
        ) {
            Ok(payload) => payload,
            Err(err) => {
                info!("Training request {request_id} not sent: {err}");
                self.lifecycle = Lifecycle::failed(err.to_string());
                return request_id;
            }
        };

        info!(
            "Submitting training request {request_id}: {} from {}",
            self.algorithm, self.mode
        );
        self.jobs.begin_training(
            self.training_api.clone(),
            TrainingJob {
                request_id,
                payload,
                run_async: self.settings.async_training,
                poll_interval: self.settings.poll_interval(),
                max_poll_attempts: self.settings.max_poll_attempts,
            },
        );
        request_id
    }

    /// Apply every finished background result that still matches the current state.
    pub fn poll(&mut self) {
        while let Ok(message) = self.jobs.try_recv_message() {
            match message {
                JobMessage::FileDecoded(result) => self.apply_decode(result),
                JobMessage::PreviewLoaded(result) => self.apply_preview(result),
                JobMessage::Training(update) => self.apply_training(update),
            }
        }
    }

    /// Poll until nothing is outstanding. Returns `false` on timeout.
    pub fn wait_until_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if !self.is_busy() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(SETTLE_POLL_INTERVAL);
        }
    }

    fn numeric_input(&self) -> Result<NumericInput, TabularError> {
        let rows = extract_input(self.upload.table(), self.upload.selected_columns())?;
        Ok(NumericInput {
            columns: self.upload.selected_column_names(),
            rows,
        })
    }

    fn abandon_submission(&mut self, reason: &str) {
        if let Some(request_id) = self.jobs.abandon_training() {
            info!("Abandoned training request {request_id}: {reason}");
            self.lifecycle = Lifecycle::Idle;
        }
    }

    fn invalidate_preview(&mut self) {
        self.preview_generation = self.preview_generation.wrapping_add(1);
        self.pending_preview = None;
        self.preview = None;
        self.preview_error = None;
    }

    fn start_decode(&mut self) {
        let Some(file) = self.upload.files().first() else {
            return;
        };
        let generation = self.upload_generation;
        let job = DecodeJob {
            generation,
            path: file.path.clone(),
            max_bytes: self.max_file_bytes,
        };
        debug!("Decoding {} (generation {generation})", file.path.display());
        match self.jobs.send_decode_job(job) {
            Ok(()) => self.pending_decode = Some(generation),
            Err(job) => {
                warn!("File decoder unavailable for {}", job.path.display());
                self.upload
                    .set_decode_failed("File decoder is not running".to_string());
            }
        }
    }

    fn apply_decode(&mut self, result: DecodeResult) {
        if self.pending_decode != Some(result.generation) {
            debug!(
                "Discarding stale decode of {} (generation {})",
                result.path.display(),
                result.generation
            );
            return;
        }
        self.pending_decode = None;
        match result.result {
            Ok(table) => {
                info!(
                    "Decoded {}: {} rows, {} columns",
                    result.path.display(),
                    table.rows.len(),
                    table.column_count()
                );
                self.upload.set_table(table);
            }
            Err(err) => {
                warn!("Failed to decode {}: {err}", result.path.display());
                self.upload.set_decode_failed(err.to_string());
            }
        }
    }

    fn apply_preview(&mut self, result: PreviewResult) {
        if self.pending_preview != Some(result.generation) {
            debug!("Discarding stale query preview {}", result.generation);
            return;
        }
        self.pending_preview = None;
        match result.result {
            Ok(table) => self.preview = Some(table),
            Err(err) => {
                warn!("Query preview failed: {err}");
                self.preview_error = Some(err.to_string());
            }
        }
    }

    fn apply_training(&mut self, update: TrainingUpdate) {
        if self.jobs.active_request_id() != Some(update.request_id) {
            debug!("Discarding stale result of training request {}", update.request_id);
            return;
        }
        if !update.lifecycle.is_in_flight() {
            self.jobs.finish_training(update.request_id);
        }
        match &update.lifecycle {
            Lifecycle::Succeeded { model_id } => {
                info!("Training request {} produced model {model_id}", update.request_id);
            }
            Lifecycle::Failed { message } => {
                info!("Training request {} failed: {message}", update.request_id);
            }
            Lifecycle::Pending { task_id } => {
                debug!("Training request {} pending (task {task_id:?})", update.request_id);
            }
            Lifecycle::Idle | Lifecycle::Submitting => {}
        }
        self.lifecycle = update.lifecycle;
    }
}
