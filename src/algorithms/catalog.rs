use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a trainable algorithm, rendered as its train-endpoint name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmId {
    Kmeans,
    LinearRegression,
    BatchRcf,
}

impl AlgorithmId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kmeans => "kmeans",
            Self::LinearRegression => "linear_regression",
            Self::BatchRcf => "batch_rcf",
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The requested algorithm name is not in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown algorithm '{0}'")]
pub struct UnknownAlgorithm(pub String);

impl FromStr for AlgorithmId {
    type Err = UnknownAlgorithm;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        CATALOG
            .iter()
            .map(|spec| spec.id)
            .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownAlgorithm(wanted.to_string()))
    }
}

/// Declared default for a hyperparameter; its variant also fixes the value kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamDefault {
    Integer(i64),
    Float(f64),
    Text(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub default: ParamDefault,
    /// Closed set of accepted text values, when the parameter is an enum.
    pub choices: Option<&'static [&'static str]>,
}

/// How an algorithm consumes its training input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// Every selected column/field is a feature.
    Unsupervised,
    /// One selected column/field, named by `target_param`, is the label.
    Supervised { target_param: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlgorithmSpec {
    pub id: AlgorithmId,
    pub label: &'static str,
    pub parameters: &'static [ParameterSpec],
    pub shape: PayloadShape,
}

impl AlgorithmSpec {
    pub fn parameter(&self, name: &str) -> Option<&'static ParameterSpec> {
        self.parameters.iter().find(|param| param.name == name)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parameters.iter().map(|param| param.name)
    }
}

const fn param(name: &'static str, default: ParamDefault) -> ParameterSpec {
    ParameterSpec {
        name,
        default,
        choices: None,
    }
}

const fn choice(
    name: &'static str,
    default: &'static str,
    choices: &'static [&'static str],
) -> ParameterSpec {
    ParameterSpec {
        name,
        default: ParamDefault::Text(default),
        choices: Some(choices),
    }
}

const KMEANS_PARAMS: &[ParameterSpec] = &[
    param("centroids", ParamDefault::Integer(2)),
    param("iterations", ParamDefault::Integer(10)),
    choice("distance_type", "EUCLIDEAN", &["EUCLIDEAN", "COSINE", "L1"]),
];

const LINEAR_REGRESSION_PARAMS: &[ParameterSpec] = &[
    param("target", ParamDefault::Text("")),
    choice(
        "objective_type",
        "SQUARED_LOSS",
        &["SQUARED_LOSS", "ABSOLUTE_LOSS", "HUBER"],
    ),
    choice(
        "optimizer_type",
        "SIMPLE_SGD",
        &["SIMPLE_SGD", "LINEAR_DECAY_SGD", "SQRT_DECAY_SGD", "ADA_GRAD", "ADA_DELTA", "ADAM"],
    ),
    param("learning_rate", ParamDefault::Float(0.01)),
    param("epochs", ParamDefault::Integer(1)),
    param("batch_size", ParamDefault::Integer(1)),
];

const BATCH_RCF_PARAMS: &[ParameterSpec] = &[
    param("number_of_trees", ParamDefault::Integer(30)),
    param("shingle_size", ParamDefault::Integer(8)),
    param("sample_size", ParamDefault::Integer(256)),
    param("output_after", ParamDefault::Integer(32)),
    param("anomaly_score_threshold", ParamDefault::Float(1.0)),
];

static CATALOG: [AlgorithmSpec; 3] = [
    AlgorithmSpec {
        id: AlgorithmId::Kmeans,
        label: "K-means",
        parameters: KMEANS_PARAMS,
        shape: PayloadShape::Unsupervised,
    },
    AlgorithmSpec {
        id: AlgorithmId::LinearRegression,
        label: "Linear regression",
        parameters: LINEAR_REGRESSION_PARAMS,
        shape: PayloadShape::Supervised {
            target_param: "target",
        },
    },
    AlgorithmSpec {
        id: AlgorithmId::BatchRcf,
        label: "Batch random cut forest",
        parameters: BATCH_RCF_PARAMS,
        shape: PayloadShape::Unsupervised,
    },
];

/// Every selectable algorithm, in menu order.
pub fn catalog() -> &'static [AlgorithmSpec] {
    &CATALOG
}

pub fn spec_for(id: AlgorithmId) -> &'static AlgorithmSpec {
    // Every AlgorithmId variant has exactly one catalog entry.
    match id {
        AlgorithmId::Kmeans => &CATALOG[0],
        AlgorithmId::LinearRegression => &CATALOG[1],
        AlgorithmId::BatchRcf => &CATALOG[2],
    }
}
