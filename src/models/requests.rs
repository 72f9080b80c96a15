//! Request types for experiment fetches

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::{verify_type, ValueType};
use crate::error::{CacheError, Result};

/// Platform reported to the experiment endpoint
pub const PLATFORM: &str = "rust";

/// Library version reported to the experiment endpoint
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parameters of one experiment lookup.
///
/// # Fields
/// - `param_name`: experiment variable to resolve
/// - `value_type`: expected type of the variable
/// - `default_value`: returned when no experiment yields a usable value
/// - `enable_auto_track_event`: emit `$ABTestTrigger` for the result (default true)
/// - `timeout_ms`: fetch timeout, the client default when unset
/// - `properties`: targeting properties sent to the endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchParams {
    pub param_name: String,
    pub value_type: ValueType,
    pub default_value: Value,
    #[serde(default = "default_auto_track")]
    pub enable_auto_track_event: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn default_auto_track() -> bool {
    true
}

impl FetchParams {
    pub fn new(param_name: impl Into<String>, value_type: ValueType, default_value: Value) -> Self {
        Self {
            param_name: param_name.into(),
            value_type,
            default_value,
            enable_auto_track_event: true,
            timeout_ms: None,
            properties: Map::new(),
        }
    }

    /// Builder-style setter for the fetch timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Builder-style setter disabling the automatic trigger event.
    pub fn without_auto_track(mut self) -> Self {
        self.enable_auto_track_event = false;
        self
    }

    /// Validates the parameters before any network or store traffic.
    pub fn validate(&self) -> Result<()> {
        if self.param_name.is_empty() {
            return Err(CacheError::InvalidRequest(
                "param_name cannot be empty".to_string(),
            ));
        }
        if !verify_type(&self.default_value, self.value_type) {
            return Err(CacheError::InvalidRequest(format!(
                "default_value should match value_type {}",
                self.value_type
            )));
        }
        Ok(())
    }
}

/// Body posted to the experiment endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FetchRequest<'a> {
    pub platform: &'static str,
    pub abtest_lib_version: &'static str,
    pub properties: &'a Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<&'a str>,
}

impl<'a> FetchRequest<'a> {
    /// Identifies the user as `login_id` or `anonymous_id` depending on `is_login_id`.
    pub fn new(distinct_id: &'a str, is_login_id: bool, properties: &'a Map<String, Value>) -> Self {
        let (login_id, anonymous_id) = if is_login_id {
            (Some(distinct_id), None)
        } else {
            (None, Some(distinct_id))
        };
        Self {
            platform: PLATFORM,
            abtest_lib_version: LIB_VERSION,
            properties,
            login_id,
            anonymous_id,
        }
    }
}
