//! Configuration Module
//!
//! Loads client, store and cache settings from environment variables and
//! applies the capacity/TTL clamping rules shared by every cache.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Public Constants ==
/// Capacity used when none (or a non-positive one) is configured
pub const DEFAULT_CAPACITY: usize = 4096;

/// Entry TTL in seconds; also the upper bound for configured TTLs
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// Namespace prepended to every key written to a shared store
pub const DEFAULT_NAMESPACE: &str = "sensors:AB:SDK:";

/// Default timeout for experiment fetches, in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Default deadline for a single store round trip, in milliseconds
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 1000;

const DEFAULT_API_URL: &str = "http://localhost:8202/api/v2/abtest/online/results";

// == Backend Kind ==
/// The family of key-value service backing the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memcached,
    /// In-process store, for tests and single-process use
    Memory,
}

impl BackendKind {
    /// Port the backend conventionally listens on.
    pub fn default_port(&self) -> u16 {
        match self {
            BackendKind::Redis => 6379,
            BackendKind::Memcached => 11211,
            BackendKind::Memory => 0,
        }
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memcached" => Ok(BackendKind::Memcached),
            "memory" => Ok(BackendKind::Memory),
            other => Err(CacheError::InvalidConfiguration(format!(
                "unsupported cache backend '{}', expected redis or memcached",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Redis => "redis",
            BackendKind::Memcached => "memcached",
            BackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

// == Store Config ==
/// Connection parameters for the backing store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    /// Password, used by Redis only
    pub auth: Option<String>,
    /// Prefix applied to every key and pattern
    pub namespace: String,
    /// Deadline applied to each store call
    pub operation_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config for `kind` at `host:port` with default namespace and timeout.
    pub fn new(kind: BackendKind, host: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            auth: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            operation_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// In-process store config.
    pub fn memory() -> Self {
        Self::new(BackendKind::Memory, "localhost", 0)
    }
}

// == Cache Settings ==
/// Parameters of one LRU cache living in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Namespace of this cache's nodes and sentinels
    pub prefix: String,
    /// Maximum number of non-sentinel nodes
    pub capacity: usize,
    /// Expiry granted to a node on every flush
    pub ttl: Duration,
}

impl CacheSettings {
    /// Creates settings as given, without clamping.
    pub fn new(prefix: impl Into<String>, capacity: usize, ttl_secs: u64) -> Self {
        Self {
            prefix: prefix.into(),
            capacity,
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Creates settings from raw user input, falling back to the defaults for
    /// non-positive capacities and for TTLs outside `(0, DEFAULT_TTL_SECS)`.
    pub fn clamped(prefix: impl Into<String>, capacity: Option<i64>, ttl_secs: Option<i64>) -> Self {
        Self::new(prefix, clamp_capacity(capacity), clamp_ttl_secs(ttl_secs))
    }

    /// Checks the settings an [`LruCache`](crate::cache::LruCache) cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "cache prefix cannot be empty".to_string(),
            ));
        }
        if self.ttl.as_secs() == 0 {
            return Err(CacheError::InvalidConfiguration(
                "cache TTL must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns `raw` when positive, otherwise [`DEFAULT_CAPACITY`].
pub fn clamp_capacity(raw: Option<i64>) -> usize {
    match raw {
        Some(n) if n > 0 => n as usize,
        _ => DEFAULT_CAPACITY,
    }
}

/// Returns `raw` when in `(0, DEFAULT_TTL_SECS)`, otherwise [`DEFAULT_TTL_SECS`].
pub fn clamp_ttl_secs(raw: Option<i64>) -> u64 {
    match raw {
        Some(n) if n > 0 && (n as u64) < DEFAULT_TTL_SECS => n as u64,
        _ => DEFAULT_TTL_SECS,
    }
}

// == Config ==
/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Experiment results endpoint
    pub api_url: String,
    /// Backing store; `None` disables caching entirely
    pub store: Option<StoreConfig>,
    /// Experiment result cache
    pub experiment_cache: CacheSettings,
    /// `$ABTestTrigger` dedupe cache
    pub event_cache: CacheSettings,
    /// Whether trigger events are deduplicated through the event cache
    pub enable_event_cache: bool,
    /// Default experiment fetch timeout
    pub request_timeout: Duration,
}

impl Config {
    /// Creates a config for `api_url` without caching.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter for the backing store.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads the configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `ABTEST_API_URL` - Experiment results endpoint
    /// - `CACHE_BACKEND` - `redis`, `memcached` or `memory` (unset = no caching)
    /// - `CACHE_HOST` / `CACHE_PORT` / `CACHE_AUTH` - Store connection
    /// - `CACHE_NAMESPACE` - Global key namespace (default: `sensors:AB:SDK:`)
    /// - `EXPERIMENT_CACHE_SIZE` / `EXPERIMENT_CACHE_TIME` - default 4096 / 86400
    /// - `EVENT_CACHE_SIZE` / `EVENT_CACHE_TIME` - default 4096 / 86400
    /// - `ENABLE_EVENT_CACHE` - default true
    /// - `REQUEST_TIMEOUT_MS` - default 3000
    /// - `STORE_TIMEOUT_MS` - default 1000
    ///
    /// Fails only on an unknown `CACHE_BACKEND`.
    pub fn from_env() -> Result<Self> {
        let store = match env::var("CACHE_BACKEND").ok().filter(|v| !v.trim().is_empty()) {
            Some(kind) => {
                let kind: BackendKind = kind.parse()?;
                let mut store = StoreConfig::new(
                    kind,
                    env::var("CACHE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                    env_parse("CACHE_PORT").unwrap_or_else(|| kind.default_port()),
                );
                store.auth = env::var("CACHE_AUTH").ok().filter(|v| !v.is_empty());
                if let Ok(namespace) = env::var("CACHE_NAMESPACE") {
                    store.namespace = namespace;
                }
                store.operation_timeout = Duration::from_millis(
                    env_parse("STORE_TIMEOUT_MS").unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
                );
                Some(store)
            }
            None => None,
        };

        Ok(Self {
            api_url: env::var("ABTEST_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            store,
            experiment_cache: CacheSettings::clamped(
                "experiment",
                env_parse("EXPERIMENT_CACHE_SIZE"),
                env_parse("EXPERIMENT_CACHE_TIME"),
            ),
            event_cache: CacheSettings::clamped(
                "event",
                env_parse("EVENT_CACHE_SIZE"),
                env_parse("EVENT_CACHE_TIME"),
            ),
            enable_event_cache: env_parse("ENABLE_EVENT_CACHE").unwrap_or(true),
            request_timeout: Duration::from_millis(
                env_parse("REQUEST_TIMEOUT_MS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            store: None,
            experiment_cache: CacheSettings::new("experiment", DEFAULT_CAPACITY, DEFAULT_TTL_SECS),
            event_cache: CacheSettings::new("event", DEFAULT_CAPACITY, DEFAULT_TTL_SECS),
            enable_event_cache: true,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
