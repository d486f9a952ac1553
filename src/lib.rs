//! Train machine-learning models on a search cluster from uploaded files or live queries.
//!
//! [`training::TrainingSession`] holds one training form: the chosen
//! algorithm and its parameters, the data source, and the state of the
//! latest submission. The cluster itself sits behind the
//! [`cluster::TrainingApi`] and [`cluster::QueryApi`] traits.

/// Resolve the per-user application directory.
pub mod app_dirs;
/// Tracing subscriber setup with per-launch log files.
pub mod logging;
/// Shared HTTP agent, bounded body reads and retry helpers.
pub(crate) mod http_client;
/// `config.toml` loading and saving.
pub mod config;
/// Algorithm catalog and hyperparameter defaults.
pub mod algorithms;
/// Canonical table, file decoding and numeric projection.
pub mod tabular;
/// Upload and query data sources.
pub mod data_source;
/// REST client for the cluster's ML and search endpoints.
pub mod cluster;
/// Request building and the training session controller.
pub mod training;

pub use algorithms::{AlgorithmId, ParameterMap, defaults_for};
pub use data_source::DataSourceMode;
pub use training::{Lifecycle, TrainingSession, build_request};
