//! A/B-Testing Client
//!
//! Resolves experiment parameters for a user, optionally reading experiments
//! through the store-backed LRU cache, and emits `$ABTestTrigger` events
//! deduplicated through a second cache.
//!
//! Store trouble never fails a lookup: every cache path logs and falls back
//! to talking to the experiment endpoint directly.

mod convert;
mod fetch;
mod track;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cache::LruCache;
use crate::config::{CacheSettings, Config, DEFAULT_TTL_SECS};
use crate::error::{CacheError, Result};
use crate::models::{Experiment, ExperimentResult, FetchParams};
use crate::store::{self, Backend};

pub use convert::{convert_value, is_truthy, select_result, verify_type, ValueType};
pub use fetch::{ExperimentFetcher, HttpExperimentFetcher};
pub use track::{EventTracker, LogEventTracker, TrackedEvent, TRIGGER_EVENT};

/// Store key marking that `$lib_plugin_version` was reported recently
pub const PLUGIN_VERSION_MARKER: &str = "has_lib_plugin_version";

/// Value reported as `$lib_plugin_version`
pub const PLUGIN_VERSION: &str = concat!("rust_abtesting:", env!("CARGO_PKG_VERSION"));

// == Client ==
pub struct AbTestingClient {
    config: Config,
    fetcher: Arc<dyn ExperimentFetcher>,
    tracker: Arc<dyn EventTracker>,
    experiment_cache: Option<LruCache>,
    event_cache: Option<LruCache>,
    /// Plain store for the plugin-version marker
    marker_store: Option<Arc<dyn Backend>>,
}

impl AbTestingClient {
    // == Constructors ==
    /// Creates a client, connecting to `config.store` when one is set.
    ///
    /// An unreachable store is logged and leaves the client uncached.
    ///
    /// # Errors
    /// `InvalidConfiguration` for an unusable store or cache configuration.
    pub async fn new(
        config: Config,
        fetcher: Arc<dyn ExperimentFetcher>,
        tracker: Arc<dyn EventTracker>,
    ) -> Result<Self> {
        let backend = match &config.store {
            Some(store_config) => match store::connect(store_config).await {
                Ok(backend) => Some(backend),
                Err(e) if e.is_store_unavailable() => {
                    warn!(
                        "Cache server can not connect ({}); fast fetches fall back to direct fetches",
                        e
                    );
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };
        Self::build(config, backend, fetcher, tracker).await
    }

    /// Creates a client over an already connected backend.
    pub async fn with_backend(
        config: Config,
        backend: Arc<dyn Backend>,
        fetcher: Arc<dyn ExperimentFetcher>,
        tracker: Arc<dyn EventTracker>,
    ) -> Result<Self> {
        Self::build(config, Some(backend), fetcher, tracker).await
    }

    /// Creates a client fetching over HTTP and logging events.
    pub async fn from_config(config: Config) -> Result<Self> {
        let fetcher = HttpExperimentFetcher::new(config.api_url.clone(), config.request_timeout)?;
        Self::new(config, Arc::new(fetcher), Arc::new(LogEventTracker)).await
    }

    async fn build(
        config: Config,
        backend: Option<Arc<dyn Backend>>,
        fetcher: Arc<dyn ExperimentFetcher>,
        tracker: Arc<dyn EventTracker>,
    ) -> Result<Self> {
        let (experiment_cache, event_cache) = match &backend {
            Some(backend) => {
                let experiments = open_cache(backend, &config.experiment_cache).await?;
                let events = if config.enable_event_cache {
                    open_cache(backend, &config.event_cache).await?
                } else {
                    None
                };
                (experiments, events)
            }
            None => (None, None),
        };

        info!(
            "A/B testing client ready: experiment cache {}, event cache {}",
            if experiment_cache.is_some() { "on" } else { "off" },
            if event_cache.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            config,
            fetcher,
            tracker,
            experiment_cache,
            event_cache,
            marker_store: backend,
        })
    }

    // == Accessors ==
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn experiment_cache(&self) -> Option<&LruCache> {
        self.experiment_cache.as_ref()
    }

    pub fn event_cache(&self) -> Option<&LruCache> {
        self.event_cache.as_ref()
    }

    // == Fetch ==
    /// Resolves `params` for the user straight from the experiment endpoint.
    pub async fn async_fetch_abtest(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Result<ExperimentResult> {
        self.fetch_abtest(distinct_id, is_login_id, params, false).await
    }

    /// Resolves `params` for the user, reading experiments through the
    /// experiment cache when one is available.
    pub async fn fast_fetch_abtest(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Result<ExperimentResult> {
        self.fetch_abtest(distinct_id, is_login_id, params, true).await
    }

    async fn fetch_abtest(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
        use_cache: bool,
    ) -> Result<ExperimentResult> {
        params.validate()?;
        if distinct_id.is_empty() {
            return Err(CacheError::InvalidRequest(
                "distinct_id cannot be empty".to_string(),
            ));
        }

        let experiments = match (&self.experiment_cache, use_cache) {
            (Some(cache), true) => {
                self.cached_experiments(cache, distinct_id, is_login_id, params)
                    .await
            }
            _ => self.fetch_experiments(distinct_id, is_login_id, params).await,
        };

        let result = select_result(&experiments, distinct_id, is_login_id, params);
        if params.enable_auto_track_event {
            self.track_abtest_trigger(&result, Map::new()).await;
        }
        Ok(result)
    }

    /// Read-through lookup. Empty experiment lists are neither served from
    /// nor written to the cache.
    async fn cached_experiments(
        &self,
        cache: &LruCache,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Vec<Experiment> {
        let key = user_key(distinct_id, is_login_id);

        match cache.get::<Vec<Experiment>>(&key).await {
            Ok(Some(experiments)) if !experiments.is_empty() => {
                debug!("experiment cache hit for {}", key);
                return experiments;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Experiment cache unavailable ({}); fetching from server directly", e);
                return self.fetch_experiments(distinct_id, is_login_id, params).await;
            }
        }

        let experiments = self.fetch_experiments(distinct_id, is_login_id, params).await;
        if !experiments.is_empty() {
            if let Err(e) = cache.put(&key, &experiments).await {
                warn!("Could not cache experiments for {}: {}", key, e);
            }
        }
        experiments
    }

    async fn fetch_experiments(
        &self,
        distinct_id: &str,
        is_login_id: bool,
        params: &FetchParams,
    ) -> Vec<Experiment> {
        match self.fetcher.fetch(distinct_id, is_login_id, params).await {
            Ok(experiments) => experiments,
            Err(e) => {
                warn!("Fetch experiment result failed: {}", e);
                Vec::new()
            }
        }
    }

    // == Track ==
    /// Emits `$ABTestTrigger` for an experiment result.
    ///
    /// Nothing is emitted for default-value and white-list results, nor for a
    /// (user, experiment) pair already recorded in the event cache. Returns
    /// whether an event was handed to the tracker. Failures are logged.
    pub async fn track_abtest_trigger(
        &self,
        result: &ExperimentResult,
        custom_properties: Map<String, Value>,
    ) -> bool {
        if result.is_white_list == Some(true) {
            return false;
        }
        let Some(experiment_id) = result.abtest_experiment_id.as_deref() else {
            return false;
        };

        if self.seen_before(result, experiment_id).await {
            debug!(
                "{} already triggered for {} in experiment {}",
                TRIGGER_EVENT, result.distinct_id, experiment_id
            );
            return false;
        }

        let mut properties = Map::new();
        properties.insert("$abtest_experiment_id".to_string(), json!(experiment_id));
        properties.insert(
            "$abtest_experiment_group_id".to_string(),
            json!(result.abtest_experiment_group_id),
        );
        if self.should_report_plugin_version().await {
            properties.insert("$lib_plugin_version".to_string(), json!([PLUGIN_VERSION]));
        }
        properties.extend(custom_properties);

        let event = TrackedEvent {
            distinct_id: result.distinct_id.clone(),
            is_login_id: result.is_login_id,
            event: TRIGGER_EVENT.to_string(),
            properties,
        };
        match self.tracker.track(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Track {} failed: {}", TRIGGER_EVENT, e);
                false
            }
        }
    }

    /// Checks the event cache and records the pair as seen.
    async fn seen_before(&self, result: &ExperimentResult, experiment_id: &str) -> bool {
        let Some(cache) = &self.event_cache else {
            return false;
        };
        let key = format!(
            "{}{}",
            user_key(&result.distinct_id, result.is_login_id),
            experiment_id
        );

        match cache.get_value(&key).await {
            Ok(hit) => {
                if let Err(e) = cache.put(&key, &1).await {
                    warn!("Could not record trigger for {}: {}", key, e);
                }
                hit.is_some()
            }
            Err(e) => {
                warn!("Event cache unavailable ({}); not deduplicating", e);
                false
            }
        }
    }

    /// True at most once per marker lifetime when a store is configured,
    /// always true without one.
    async fn should_report_plugin_version(&self) -> bool {
        let Some(store) = &self.marker_store else {
            return true;
        };

        match store.get(PLUGIN_VERSION_MARKER).await {
            Ok(Some(_)) => false,
            Ok(None) => {
                let expires_at = Utc::now() + chrono::Duration::seconds(DEFAULT_TTL_SECS as i64);
                if let Err(e) = store.set(PLUGIN_VERSION_MARKER, "1", expires_at).await {
                    warn!("Could not store plugin version marker: {}", e);
                }
                true
            }
            Err(e) => {
                warn!("Plugin version marker unavailable: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for AbTestingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbTestingClient")
            .field("api_url", &self.config.api_url)
            .field("experiment_cache", &self.experiment_cache.is_some())
            .field("event_cache", &self.event_cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Cache key of a user: the distinct id followed by `"1"` for login ids.
pub fn user_key(distinct_id: &str, is_login_id: bool) -> String {
    format!("{}{}", distinct_id, if is_login_id { "1" } else { "" })
}

async fn open_cache(backend: &Arc<dyn Backend>, settings: &CacheSettings) -> Result<Option<LruCache>> {
    match LruCache::new(backend.clone(), settings.clone()).await {
        Ok(cache) => Ok(Some(cache)),
        Err(e) if e.is_store_unavailable() => {
            warn!("{} cache disabled: {}", settings.prefix, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
