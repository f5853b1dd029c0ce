use reqwest::Url;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::retry_transport::RetryParams;
use super::router_error::RouterError;
use super::trigger::TriggerDefinition;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8888";
const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:8889";
const DEFAULT_EXECUTOR_URL: &str = "http://executor.fission";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub listen_addr: String,
    pub admin_addr: String,
    pub executor_url: Url,
    pub retry: RetryParams,
    /// Zero disables expiry.
    pub cache_ttl: Duration,
    /// Zero means unbounded.
    pub cache_capacity: usize,
    pub cache_sweep_interval: Duration,
    /// Largest request body buffered for replay.
    pub max_body_bytes: usize,
    pub triggers_file: Option<PathBuf>,
}

impl RouterConfig {
    pub fn from_env() -> Result<Self, RouterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RouterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryParams::default();
        let retry = RetryParams {
            timeout: Duration::from_millis(parse_var(
                &lookup,
                "ROUTER_ROUND_TRIP_TIMEOUT_MS",
                defaults.timeout.as_millis() as u64,
            )?),
            timeout_exponent: parse_var(
                &lookup,
                "ROUTER_ROUND_TRIP_TIMEOUT_EXPONENT",
                defaults.timeout_exponent,
            )?,
            keep_alive: Duration::from_secs(parse_var(
                &lookup,
                "ROUTER_ROUND_TRIP_KEEP_ALIVE_SECS",
                defaults.keep_alive.as_secs(),
            )?),
            max_retries: parse_var(&lookup, "ROUTER_ROUND_TRIP_MAX_RETRIES", defaults.max_retries)?,
        };
        retry.validate()?;

        let executor_url = lookup("EXECUTOR_URL").unwrap_or_else(|| DEFAULT_EXECUTOR_URL.to_string());
        let executor_url = Url::parse(&executor_url)
            .map_err(|e| RouterError::Config(format!("invalid EXECUTOR_URL {}: {}", executor_url, e)))?;

        let sweep_secs = parse_var(&lookup, "ROUTER_CACHE_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if sweep_secs == 0 {
            return Err(RouterError::Config(
                "ROUTER_CACHE_SWEEP_INTERVAL_SECS must be positive".into(),
            ));
        }

        Ok(Self {
            listen_addr: lookup("ROUTER_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            admin_addr: lookup("ROUTER_ADMIN_ADDR").unwrap_or_else(|| DEFAULT_ADMIN_ADDR.to_string()),
            executor_url,
            retry,
            cache_ttl: Duration::from_secs(parse_var(&lookup, "ROUTER_SERVICE_CACHE_TTL_SECS", 0u64)?),
            cache_capacity: parse_var(&lookup, "ROUTER_SERVICE_CACHE_CAPACITY", 0usize)?,
            cache_sweep_interval: Duration::from_secs(sweep_secs),
            max_body_bytes: parse_var(&lookup, "ROUTER_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            triggers_file: lookup("ROUTER_TRIGGERS_FILE")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Reads a JSON array of trigger definitions.
pub fn load_triggers(path: &Path) -> Result<Vec<TriggerDefinition>, RouterError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RouterError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| RouterError::Config(format!("invalid {} value: {}", key, v)))
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}
