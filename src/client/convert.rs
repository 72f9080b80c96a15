//! Variable conversion and experiment selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::models::{Experiment, ExperimentResult, FetchParams};

// == Value Type ==
/// Declared type of an experiment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Integer,
    String,
    Json,
    Boolean,
}

impl FromStr for ValueType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INTEGER" => Ok(ValueType::Integer),
            "STRING" => Ok(ValueType::String),
            "JSON" => Ok(ValueType::Json),
            "BOOLEAN" => Ok(ValueType::Boolean),
            other => Err(CacheError::InvalidRequest(format!(
                "invalid value_type '{}', expected INTEGER, STRING, JSON or BOOLEAN",
                other
            ))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Integer => "INTEGER",
            ValueType::String => "STRING",
            ValueType::Json => "JSON",
            ValueType::Boolean => "BOOLEAN",
        };
        f.write_str(name)
    }
}

// == Verification ==
/// Whether a caller-supplied default is usable as `value_type`.
///
/// Numeric strings count as integers.
pub fn verify_type(value: &Value, value_type: ValueType) -> bool {
    match value_type {
        ValueType::Integer => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        ValueType::String => value.is_string(),
        ValueType::Json => value.is_object(),
        ValueType::Boolean => value.is_boolean(),
    }
}

// == Conversion ==
/// Converts the transmitted string form of a variable.
///
/// Returns `None` for malformed JSON and unrecognised booleans. Integers
/// that do not parse become `0`.
pub fn convert_value(raw: &str, value_type: ValueType) -> Option<Value> {
    match value_type {
        ValueType::String => Some(Value::String(raw.to_string())),
        ValueType::Integer => {
            let raw = raw.trim();
            let n = raw
                .parse::<i64>()
                .ok()
                .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
                .unwrap_or(0);
            Some(Value::from(n))
        }
        ValueType::Json => serde_json::from_str(raw).ok(),
        ValueType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" | "" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

/// Truthiness used to decide whether a converted value is taken.
/// `false`, `0`, `""`, `"0"`, `[]` and `null` are not.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

// == Selection ==
/// Picks the first variable named `params.param_name` with the requested
/// type whose converted value is truthy, scanning experiments in order.
/// Falls back to `params.default_value`.
pub fn select_result(
    experiments: &[Experiment],
    distinct_id: &str,
    is_login_id: bool,
    params: &FetchParams,
) -> ExperimentResult {
    for experiment in experiments {
        for variable in &experiment.variables {
            if variable.name != params.param_name {
                continue;
            }
            if variable.value_type.parse::<ValueType>().ok() != Some(params.value_type) {
                continue;
            }
            if let Some(value) = convert_value(&variable.value, params.value_type) {
                if is_truthy(&value) {
                    return ExperimentResult::from_experiment(distinct_id, is_login_id, experiment, value);
                }
            }
        }
    }

    ExperimentResult::fallback(distinct_id, is_login_id, params.default_value.clone())
}
