//! Parameter distributions and sampled values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TrialError;

/// Describes the range a parameter is sampled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum Distribution {
    /// Continuous range `[low, high]`, optionally sampled in log space.
    Float {
        low: f64,
        high: f64,
        #[serde(default)]
        log: bool,
    },
    /// Integer range `[low, high]` inclusive.
    Int { low: i64, high: i64 },
    /// One of a fixed list of choices.
    Categorical { choices: Vec<Value> },
}

impl Distribution {
    /// Check the distribution is well-formed.
    pub fn validate(&self, name: &str) -> Result<(), TrialError> {
        let invalid = |reason: String| TrialError::InvalidDistribution {
            name: name.to_string(),
            reason,
        };
        match self {
            Self::Float { low, high, log } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(invalid("bounds must be finite".to_string()));
                }
                if low > high {
                    return Err(invalid(format!("low ({low}) is greater than high ({high})")));
                }
                if *log && *low <= 0.0 {
                    return Err(invalid(format!(
                        "log sampling needs a positive low bound, got {low}"
                    )));
                }
            }
            Self::Int { low, high } => {
                if low > high {
                    return Err(invalid(format!("low ({low}) is greater than high ({high})")));
                }
            }
            Self::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("no choices given".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Whether `value` lies inside this distribution.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Self::Float { low, high, .. }, ParamValue::Float(v)) => *low <= *v && *v <= *high,
            (Self::Int { low, high }, ParamValue::Int(v)) => *low <= *v && *v <= *high,
            (Self::Categorical { choices }, ParamValue::Json(v)) => choices.contains(v),
            _ => false,
        }
    }

    /// Convert a plain JSON value (e.g. a grid point) into a value of this distribution.
    pub fn value_from_json(&self, value: &Value) -> Option<ParamValue> {
        let converted = match self {
            Self::Float { .. } => ParamValue::Float(value.as_f64()?),
            Self::Int { .. } => ParamValue::Int(value.as_i64()?),
            Self::Categorical { .. } => ParamValue::Json(value.clone()),
        };
        self.contains(&converted).then_some(converted)
    }

    /// Numeric position of `value` in this distribution, used for plotting.
    ///
    /// Categorical values map to the index of the choice.
    pub fn to_numeric(&self, value: &ParamValue) -> Option<f64> {
        match (self, value) {
            (Self::Categorical { choices }, ParamValue::Json(v)) => {
                choices.iter().position(|c| c == v).map(|i| i as f64)
            }
            _ => value.as_f64(),
        }
    }
}

/// A concrete parameter value drawn from a [`Distribution`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Json(Value),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Json(v) => v.as_f64(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(_) => None,
            Self::Json(v) => v.as_i64(),
        }
    }

    /// The value as plain JSON, the form handed to user code.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Float(v) => Value::from(*v),
            Self::Int(v) => Value::from(*v),
            Self::Json(v) => v.clone(),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}
