//! Search cluster boundaries: training, index discovery and search.
//!
//! The session talks to these through the [`TrainingApi`] and [`QueryApi`]
//! traits so tests can swap in stubs; [`ClusterClient`] is the HTTP
//! implementation of both.

mod client;
mod indices;
mod training;

pub use client::{ClusterClient, TransportError};
pub use indices::{IndexField, QueryApi, SearchRequest, flatten_mapping};
pub use training::{TaskState, TaskStatus, TrainResponse, TrainingApi};
