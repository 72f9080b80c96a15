//! abtest_cache command line
//!
//! ```text
//! abtest_cache fetch      <distinct_id> <param_name> <value_type> <default_json> [--login]
//! abtest_cache fast-fetch <distinct_id> <param_name> <value_type> <default_json> [--login]
//! abtest_cache size
//! ```
//!
//! Configuration comes from the environment (see [`Config::from_env`]).

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use abtest_cache::client::{HttpExperimentFetcher, LogEventTracker, ValueType};
use abtest_cache::config::BackendKind;
use abtest_cache::models::FetchParams;
use abtest_cache::store::MemoryBackend;
use abtest_cache::{spawn_cleanup_task, AbTestingClient, Config};

/// Seconds between expiry sweeps of the memory backend
const SWEEP_INTERVAL_SECS: u64 = 60;

const USAGE: &str = "usage: abtest_cache <fetch|fast-fetch> <distinct_id> <param_name> <value_type> <default_json> [--login]\n       abtest_cache size";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to info for this crate, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "abtest_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let config = Config::from_env().context("loading configuration")?;
    let client = build_client(config).await?;

    match command.as_str() {
        "fetch" | "fast-fetch" => {
            let (distinct_id, is_login_id, params) = parse_fetch_args(&args[1..])?;
            let result = if command == "fetch" {
                client.async_fetch_abtest(&distinct_id, is_login_id, &params).await?
            } else {
                client.fast_fetch_abtest(&distinct_id, is_login_id, &params).await?
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "size" => {
            for cache in [client.experiment_cache(), client.event_cache()].into_iter().flatten() {
                println!("{}: {}", cache.prefix(), cache.cache_size().await?);
            }
        }
        other => bail!("unknown command '{}'\n{}", other, USAGE),
    }

    Ok(())
}

/// Builds the client; the memory backend gets its expiry sweeper here.
async fn build_client(config: Config) -> anyhow::Result<AbTestingClient> {
    let fetcher = Arc::new(HttpExperimentFetcher::new(
        config.api_url.clone(),
        config.request_timeout,
    )?);
    let tracker = Arc::new(LogEventTracker);

    match config.store.as_ref().map(|store| store.kind) {
        Some(BackendKind::Memory) => {
            let namespace = config
                .store
                .as_ref()
                .map(|store| store.namespace.clone())
                .unwrap_or_default();
            let backend = Arc::new(MemoryBackend::with_namespace(namespace));
            spawn_cleanup_task(backend.clone(), SWEEP_INTERVAL_SECS);
            info!("Using in-process memory backend");
            Ok(AbTestingClient::with_backend(config, backend, fetcher, tracker).await?)
        }
        _ => Ok(AbTestingClient::new(config, fetcher, tracker).await?),
    }
}

fn parse_fetch_args(args: &[String]) -> anyhow::Result<(String, bool, FetchParams)> {
    let is_login_id = args.iter().any(|a| a == "--login");
    let positional: Vec<&String> = args.iter().filter(|a| *a != "--login").collect();
    let [distinct_id, param_name, value_type, default_json] = positional.as_slice() else {
        bail!(USAGE);
    };

    let value_type: ValueType = value_type.parse()?;
    let default_value = serde_json::from_str(default_json)
        .with_context(|| format!("default value '{}' is not valid JSON", default_json))?;

    Ok((
        distinct_id.to_string(),
        is_login_id,
        FetchParams::new(param_name.as_str(), value_type, default_value),
    ))
}
