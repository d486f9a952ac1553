//! Pure construction of the train-endpoint payload.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::algorithms::{AlgorithmId, ParameterMap, PayloadShape, spec_for};
use crate::data_source::{DataSourceMode, QuerySelection};
use crate::tabular::NumericMatrix;

/// Upload-mode training input: the numeric matrix and the names of its columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericInput {
    pub columns: Vec<String>,
    pub rows: NumericMatrix,
}

impl NumericInput {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.columns.is_empty()
    }
}

/// Why a payload could not be built. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Parameters do not match algorithm '{algorithm}'")]
    ParametersMismatch { algorithm: AlgorithmId },
    #[error("No training data: choose a file and select at least one column")]
    EmptyInput,
    #[error("Row {row} has {found} values but {expected} columns are selected")]
    RaggedInput {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("No query: enter a query before training")]
    MissingQuery,
    #[error("No fields: select at least one field to train on")]
    NoFields,
    #[error("Parameter '{param}' must name the target column")]
    MissingTarget { param: &'static str },
    #[error("Target '{target}' is not among the selected columns")]
    TargetNotSelected { target: String },
}

/// Everything sent to the train endpoint for one submission. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingRequestPayload {
    pub algorithm: AlgorithmId,
    pub mode: DataSourceMode,
    pub body: TrainBody,
}

/// JSON body of the train endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainBody {
    pub parameters: ParameterMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_data: Option<DataFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_index: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_query: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataFrame {
    pub column_metas: Vec<ColumnMeta>,
    pub rows: Vec<DataRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: &'static str,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DataRow {
    pub values: Vec<ColumnValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnValue {
    pub column_type: &'static str,
    pub value: f64,
}

const DOUBLE: &str = "DOUBLE";

/// Combine the session's pieces into one payload for `algorithm` and `mode`.
///
/// Upload mode carries `input` as a data frame; query mode carries the
/// selected indices plus a `_source`-restricted query of `query_size` hits.
pub fn build_request(
    algorithm: AlgorithmId,
    mode: DataSourceMode,
    params: &ParameterMap,
    input: &NumericInput,
    query: &QuerySelection,
    query_size: usize,
) -> Result<TrainingRequestPayload, RequestError> {
    let spec = spec_for(algorithm);
    if params.len() != spec.parameters.len()
        || spec.parameter_names().any(|name| params.get(name).is_none())
    {
        return Err(RequestError::ParametersMismatch { algorithm });
    }

    let body = match mode {
        DataSourceMode::Upload => {
            if input.is_empty() {
                return Err(RequestError::EmptyInput);
            }
            check_target(spec.shape, params, &input.columns)?;
            TrainBody {
                parameters: params.clone(),
                input_data: Some(data_frame(input)?),
                input_index: None,
                input_query: None,
            }
        }
        DataSourceMode::Query => {
            let Some(query_body) = query.query.as_ref() else {
                return Err(RequestError::MissingQuery);
            };
            if !query.has_fields() {
                return Err(RequestError::NoFields);
            }
            let fields = query.all_fields();
            check_target(spec.shape, params, &fields)?;
            TrainBody {
                parameters: params.clone(),
                input_data: None,
                input_index: Some(query.indices()),
                input_query: Some(json!({
                    "_source": fields,
                    "size": query_size,
                    "query": query_body,
                })),
            }
        }
    };
    Ok(TrainingRequestPayload {
        algorithm,
        mode,
        body,
    })
}

fn check_target(
    shape: PayloadShape,
    params: &ParameterMap,
    available: &[String],
) -> Result<(), RequestError> {
    let PayloadShape::Supervised { target_param } = shape else {
        return Ok(());
    };
    let target = params
        .get(target_param)
        .and_then(|value| value.as_text())
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .ok_or(RequestError::MissingTarget {
            param: target_param,
        })?;
    if !available.iter().any(|column| column == target) {
        return Err(RequestError::TargetNotSelected {
            target: target.to_string(),
        });
    }
    Ok(())
}

fn data_frame(input: &NumericInput) -> Result<DataFrame, RequestError> {
    let expected = input.columns.len();
    let rows = input
        .rows
        .iter()
        .enumerate()
        .map(|(row, values)| {
            if values.len() != expected {
                return Err(RequestError::RaggedInput {
                    row,
                    found: values.len(),
                    expected,
                });
            }
            Ok(DataRow {
                values: values
                    .iter()
                    .map(|&value| ColumnValue {
                        column_type: DOUBLE,
                        value,
                    })
                    .collect(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DataFrame {
        column_metas: input
            .columns
            .iter()
            .map(|name| ColumnMeta {
                name: name.clone(),
                column_type: DOUBLE,
            })
            .collect(),
        rows,
    })
}
