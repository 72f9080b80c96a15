//! Experiment Fetching
//!
//! The experiment endpoint is reached through [`ExperimentFetcher`] so the
//! client can be exercised without a network.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::models::{Experiment, ExperimentResponse, FetchParams, FetchRequest};

const USER_AGENT: &str = concat!("abtest_cache/", env!("CARGO_PKG_VERSION"));

// == Fetcher Trait ==
/// Source of the experiments a user is enrolled in.
#[async_trait]
pub trait ExperimentFetcher: Send + Sync {
    async fn fetch(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Result<Vec<Experiment>>;
}

// == HTTP Fetcher ==
/// Posts a JSON [`FetchRequest`] to the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpExperimentFetcher {
    client: reqwest::Client,
    api_url: String,
    default_timeout: Duration,
}

impl HttpExperimentFetcher {
    /// Creates a fetcher for `api_url`, applying `default_timeout` when the
    /// request parameters carry none.
    pub fn new(api_url: impl Into<String>, default_timeout: Duration) -> Result<Self> {
        let api_url = api_url.into();
        if api_url.is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "experiment api_url cannot be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CacheError::InvalidConfiguration(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            api_url,
            default_timeout,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl ExperimentFetcher for HttpExperimentFetcher {
    async fn fetch(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Result<Vec<Experiment>> {
        let timeout = params
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        let body = FetchRequest::new(distinct_id, is_login_id, &params.properties);

        let response = self
            .client
            .post(&self.api_url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CacheError::Fetch(e.to_string()))?;

        let payload: ExperimentResponse = response
            .json()
            .await
            .map_err(|e| CacheError::Fetch(format!("malformed response: {}", e)))?;

        debug!(
            "fetched {} experiments for {} (login={})",
            payload.results.len(),
            distinct_id,
            is_login_id
        );
        Ok(payload.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_url_is_rejected() {
        let err = HttpExperimentFetcher::new("", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_error() {
        let fetcher =
            HttpExperimentFetcher::new("http://127.0.0.1:9/results", Duration::from_millis(300))
                .unwrap();
        let params = FetchParams::new(
            "color",
            crate::client::ValueType::String,
            serde_json::json!("red"),
        );

        let err = fetcher.fetch("u1", true, &params).await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch(_)));
    }
}
