use actix_web::web::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend_resolver::BackendResolver;
use super::function_identity::FunctionIdentity;
use super::router_error::RouterError;
use super::service_cache::FunctionServiceCache;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);
const DEFAULT_TIMEOUT_EXPONENT: f64 = 2.0;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 10;

/// Retry policy for proxied calls. Read-only once a transport is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryParams {
    /// Timeout of the first attempt.
    pub timeout: Duration,
    /// Each further attempt waits `timeout_exponent` times longer.
    pub timeout_exponent: f64,
    /// Idle lifetime of pooled backend connections.
    pub keep_alive: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            timeout_exponent: DEFAULT_TIMEOUT_EXPONENT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryParams {
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.timeout.is_zero() {
            return Err(RouterError::Config("round trip timeout must be positive".into()));
        }
        if !self.timeout_exponent.is_finite() || self.timeout_exponent < 1.0 {
            return Err(RouterError::Config(format!(
                "timeout exponent must be >= 1, got {}",
                self.timeout_exponent
            )));
        }
        Ok(())
    }

    /// Timeout of attempt `attempt` (0-indexed): `timeout * exponent^attempt`.
    pub fn attempt_timeout(&self, attempt: u32) -> Duration {
        let factor = self.timeout_exponent.powi(attempt.min(i32::MAX as u32) as i32);
        let nanos = self.timeout.as_nanos() as f64 * factor;
        if nanos >= u64::MAX as f64 {
            Duration::from_nanos(u64::MAX)
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

/// A buffered inbound request, replayable across attempts.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends one logical request as a bounded chain of sequential attempts.
///
/// Only transport failures (refused, reset, DNS, attempt timeout) are
/// retried. Any HTTP response, whatever its status, ends the chain.
pub struct RetryingTransport {
    client: reqwest::Client,
    params: RetryParams,
    cache: Arc<FunctionServiceCache>,
    resolver: Arc<dyn BackendResolver>,
}

impl RetryingTransport {
    pub fn new(
        params: RetryParams,
        cache: Arc<FunctionServiceCache>,
        resolver: Arc<dyn BackendResolver>,
    ) -> Result<Self, RouterError> {
        params.validate()?;
        let client = reqwest::ClientBuilder::new()
            .pool_idle_timeout(params.keep_alive)
            .tcp_keepalive(params.keep_alive)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            params,
            cache,
            resolver,
        })
    }

    pub fn params(&self) -> &RetryParams {
        &self.params
    }

    /// Cached address for `function`, asking the resolver on a miss.
    pub async fn backend_address(&self, function: &FunctionIdentity) -> Result<Url, RouterError> {
        if let Some(address) = self.cache.lookup(function) {
            log::debug!("service cache hit for {}: {}", function, address);
            return Ok(address);
        }

        let start = Instant::now();
        let address = self.resolver.resolve(function).await?;
        log::info!(
            "resolved {} to {} in {:.4}s",
            function,
            address,
            start.elapsed().as_secs_f64()
        );
        self.cache.assign(function, address.clone());
        Ok(address)
    }

    /// Forwards `request` to `function`, starting at `address`.
    ///
    /// After a failed attempt the address is invalidated (only if it is still
    /// the cached one) and re-resolved before the next attempt. Returns the
    /// response along with the address that produced it.
    pub async fn round_trip(
        &self,
        function: &FunctionIdentity,
        address: Url,
        request: &ProxyRequest,
    ) -> Result<(reqwest::Response, Url), RouterError> {
        let mut address = address;
        let mut attempt: u32 = 0;

        loop {
            let timeout = self.params.attempt_timeout(attempt);
            let send = self
                .client
                .request(request.method.clone(), target_url(&address, &request.path_and_query))
                .headers(request.headers.clone())
                .body(request.body.clone())
                .send();

            // a timed out attempt is dropped here, closing its connection
            let (reason, timed_out) = match tokio::time::timeout(timeout, send).await {
                Ok(Ok(resp)) => {
                    if attempt > 0 {
                        log::info!(
                            "{} answered on attempt {}/{}",
                            function,
                            attempt + 1,
                            self.params.max_retries + 1
                        );
                    }
                    return Ok((resp, address));
                }
                Ok(Err(err)) => {
                    let timed_out = err.is_timeout();
                    (err.to_string(), timed_out)
                }
                Err(_) => (format!("no response within {:?}", timeout), true),
            };

            log::warn!(
                "attempt {}/{} for {} at {} failed: {}",
                attempt + 1,
                self.params.max_retries + 1,
                function,
                address,
                reason
            );
            self.cache.invalidate(function, &address);

            if attempt >= self.params.max_retries {
                return Err(RouterError::RetriesExhausted {
                    function: function.clone(),
                    attempts: attempt + 1,
                    timed_out,
                    reason,
                });
            }

            address = self.backend_address(function).await?;
            attempt += 1;
        }
    }
}

fn target_url(address: &Url, path_and_query: &str) -> Url {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };
    let mut url = address.clone();
    let base = address.path().trim_end_matches('/');
    url.set_path(&format!("{}{}", base, path));
    url.set_query(query);
    url
}
