//! Catalog of trainable algorithms and their hyperparameter defaults.
//!
//! The catalog is static: every id the console can select resolves to one
//! [`AlgorithmSpec`]. Parameter maps are derived from it and replaced
//! wholesale whenever the selection changes.

mod catalog;
mod params;

pub use catalog::{
    AlgorithmId, AlgorithmSpec, ParamDefault, ParameterSpec, PayloadShape, UnknownAlgorithm,
    catalog, spec_for,
};
pub use params::{ParamValue, ParameterError, ParameterMap, defaults_for, defaults_for_name};
