use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{AlgorithmId, AlgorithmSpec, ParamDefault, spec_for};

/// Current value of one hyperparameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<ParamDefault> for ParamValue {
    fn from(default: ParamDefault) -> Self {
        match default {
            ParamDefault::Integer(value) => Self::Integer(value),
            ParamDefault::Float(value) => Self::Float(value),
            ParamDefault::Text(value) => Self::Text(value.to_string()),
        }
    }
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Errors raised while editing a parameter value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Algorithm '{algorithm}' has no parameter '{name}'")]
    UnknownParameter { algorithm: AlgorithmId, name: String },
    #[error("Invalid value '{value}' for '{name}': expected {expected}")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },
    #[error("'{value}' is not a valid choice for '{name}' (expected one of {choices})")]
    NotAChoice {
        name: String,
        value: String,
        choices: String,
    },
}

/// Parameter name to current value, keyed exactly by an algorithm's declared names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMap(BTreeMap<String, ParamValue>);

impl ParameterMap {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Set `name` from user-entered text, coerced to the kind of its declared default.
    ///
    /// Names the algorithm does not declare are rejected so the key set never drifts.
    pub fn set_from_str(
        &mut self,
        spec: &AlgorithmSpec,
        name: &str,
        raw: &str,
    ) -> Result<(), ParameterError> {
        let param = spec
            .parameter(name)
            .ok_or_else(|| ParameterError::UnknownParameter {
                algorithm: spec.id,
                name: name.to_string(),
            })?;
        let raw = raw.trim();
        let invalid = |expected| ParameterError::InvalidValue {
            name: name.to_string(),
            value: raw.to_string(),
            expected,
        };
        let value = match param.default {
            ParamDefault::Integer(_) => {
                ParamValue::Integer(raw.parse::<i64>().map_err(|_| invalid("an integer"))?)
            }
            ParamDefault::Float(_) => {
                let parsed = raw.parse::<f64>().map_err(|_| invalid("a number"))?;
                if !parsed.is_finite() {
                    return Err(invalid("a finite number"));
                }
                ParamValue::Float(parsed)
            }
            ParamDefault::Text(_) => match param.choices {
                Some(choices) => {
                    let Some(choice) = choices.iter().find(|choice| choice.eq_ignore_ascii_case(raw))
                    else {
                        return Err(ParameterError::NotAChoice {
                            name: name.to_string(),
                            value: raw.to_string(),
                            choices: choices.join(", "),
                        });
                    };
                    ParamValue::Text((*choice).to_string())
                }
                None => ParamValue::Text(raw.to_string()),
            },
        };
        self.0.insert(name.to_string(), value);
        Ok(())
    }
}

/// Fresh parameter map holding exactly the declared defaults of `id`.
pub fn defaults_for(id: AlgorithmId) -> ParameterMap {
    let spec = spec_for(id);
    ParameterMap(
        spec.parameters
            .iter()
            .map(|param| (param.name.to_string(), ParamValue::from(param.default)))
            .collect(),
    )
}

/// Defaults for an algorithm named by free text.
///
/// Unknown names yield an empty map and a warning rather than an error, since
/// selectable names come from the same catalog.
pub fn defaults_for_name(name: &str) -> ParameterMap {
    match name.parse::<AlgorithmId>() {
        Ok(id) => defaults_for(id),
        Err(err) => {
            tracing::warn!("{err}; using no parameters");
            ParameterMap::default()
        }
    }
}
