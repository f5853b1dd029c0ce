// backend resolution seam
use super::function_identity::FunctionIdentity;
use super::router_error::RouterError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

const EXECUTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Obtains a live backend for a function, creating one when none exists.
///
/// `resolve` may take as long as a cold start.
#[async_trait]
pub trait BackendResolver: Send + Sync {
    async fn resolve(&self, function: &FunctionIdentity) -> Result<Url, RouterError>;

    /// Tells the resolver the backend is still serving traffic.
    async fn tap(&self, _function: &FunctionIdentity, _address: &Url) -> Result<(), RouterError> {
        Ok(())
    }
}

// HTTP client for the executor service
#[derive(Clone)]
pub struct ExecutorClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ExecutorClient {
    pub fn new(base_url: Url) -> Result<Self, RouterError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(EXECUTOR_TIMEOUT)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RouterError> {
        self.base_url
            .join(path)
            .map_err(|e| RouterError::Config(format!("bad executor url {}: {}", self.base_url, e)))
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionRequest<'a> {
    name: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_version: Option<&'a str>,
}

#[async_trait]
impl BackendResolver for ExecutorClient {
    async fn resolve(&self, function: &FunctionIdentity) -> Result<Url, RouterError> {
        let url = self.endpoint("v2/getServiceForFunction")?;
        let payload = FunctionRequest {
            name: &function.name,
            namespace: &function.namespace,
            resource_version: function.resource_version.as_deref(),
        };

        let start = std::time::Instant::now();
        let resp = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RouterError::Resolution(function.clone(), format!("request failed: {}", e)))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            RouterError::Resolution(function.clone(), format!("failed to read response: {}", e))
        })?;

        log::info!(
            "GetServiceForFunction [{}] took: {:.4}s",
            function,
            start.elapsed().as_secs_f64()
        );

        match status {
            StatusCode::OK => parse_address(body.trim())
                .ok_or_else(|| RouterError::Resolution(function.clone(), format!("invalid address {:?}", body))),
            _ => Err(RouterError::Resolution(
                function.clone(),
                format!("executor returned {}: {}", status, body),
            )),
        }
    }

    async fn tap(&self, function: &FunctionIdentity, address: &Url) -> Result<(), RouterError> {
        let url = self.endpoint("v2/tapService")?;
        let resp = self
            .client
            .post(url)
            .body(address.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            log::warn!("tap of {} for {} returned {}", address, function, resp.status());
        }
        Ok(())
    }
}

// executor may answer with a bare host:port
fn parse_address(raw: &str) -> Option<Url> {
    if raw.is_empty() {
        return None;
    }
    let url = if raw.contains("://") {
        Url::parse(raw).ok()?
    } else {
        Url::parse(&format!("http://{}", raw)).ok()?
    };
    url.host_str()?;
    Some(url)
}
