//! Event Tracking
//!
//! Trigger events are handed to an [`EventTracker`]; delivering them to an
//! analytics pipeline is the tracker's business.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;

/// Name of the event emitted when a user is exposed to an experiment
pub const TRIGGER_EVENT: &str = "$ABTestTrigger";

/// An analytics event ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEvent {
    pub distinct_id: String,
    pub is_login_id: bool,
    pub event: String,
    pub properties: Map<String, Value>,
}

// == Tracker Trait ==
#[async_trait]
pub trait EventTracker: Send + Sync {
    async fn track(&self, event: TrackedEvent) -> Result<()>;
}

// == Log Tracker ==
/// Writes each event as one JSON line at `info` under the `abtest_cache::events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventTracker;

#[async_trait]
impl EventTracker for LogEventTracker {
    async fn track(&self, event: TrackedEvent) -> Result<()> {
        let line = serde_json::to_string(&event)?;
        info!(target: "abtest_cache::events", "{}", line);
        Ok(())
    }
}
