//! Response types for experiment fetches
//!
//! [`Experiment`] lists are what the endpoint returns and what the experiment
//! cache stores per user.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One experiment variable. `value` is always transmitted as a string and
/// converted according to `value_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: String,
}

/// An experiment the user is enrolled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub abtest_experiment_id: String,
    pub abtest_experiment_group_id: String,
    #[serde(default)]
    pub is_white_list: bool,
    #[serde(default)]
    pub is_control_group: bool,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// Body returned by the experiment endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<Experiment>,
}

/// Outcome of resolving one parameter for one user.
///
/// The experiment fields are `None` when the default value was returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub distinct_id: String,
    pub is_login_id: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abtest_experiment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abtest_experiment_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_white_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_control_group: Option<bool>,
    pub value: Value,
}

impl ExperimentResult {
    /// Result carrying the caller's default value.
    pub fn fallback(distinct_id: impl Into<String>, is_login_id: bool, value: Value) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            is_login_id,
            abtest_experiment_id: None,
            abtest_experiment_group_id: None,
            is_white_list: None,
            is_control_group: None,
            value,
        }
    }

    /// Result taken from `experiment`.
    pub fn from_experiment(
        distinct_id: impl Into<String>,
        is_login_id: bool,
        experiment: &Experiment,
        value: Value,
    ) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            is_login_id,
            abtest_experiment_id: Some(experiment.abtest_experiment_id.clone()),
            abtest_experiment_group_id: Some(experiment.abtest_experiment_group_id.clone()),
            is_white_list: Some(experiment.is_white_list),
            is_control_group: Some(experiment.is_control_group),
            value,
        }
    }

    /// Whether the value came from an experiment rather than the default.
    pub fn is_experiment(&self) -> bool {
        self.abtest_experiment_id.is_some()
    }
}
