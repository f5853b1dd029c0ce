use actix_web::body::{self, SizedStream};
use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::sync::Arc;

use super::backend_resolver::BackendResolver;
use super::function_identity::FunctionIdentity;
use super::function_selector::FunctionSelector;
use super::retry_transport::{ProxyRequest, RetryParams, RetryingTransport};
use super::router_error::RouterError;
use super::service_cache::FunctionServiceCache;
use super::trigger::TriggerDefinition;

const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const HEADER_FUNCTION_NAME: &str = "x-function-name";
const HEADER_FUNCTION_NAMESPACE: &str = "x-function-namespace";
const HEADER_FUNCTION_RESOURCE_VERSION: &str = "x-function-resourceversion";
const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Serves requests for one trigger.
///
/// Holds no per-request state: the shared cache and this trigger's
/// immutable configuration are all that outlive a request.
pub struct FunctionHandler {
    trigger: Arc<TriggerDefinition>,
    selector: Arc<dyn FunctionSelector>,
    resolver: Arc<dyn BackendResolver>,
    transport: RetryingTransport,
}

impl FunctionHandler {
    pub fn new(
        trigger: TriggerDefinition,
        defaults: RetryParams,
        cache: Arc<FunctionServiceCache>,
        resolver: Arc<dyn BackendResolver>,
        selector: Arc<dyn FunctionSelector>,
    ) -> Result<Self, RouterError> {
        let params = trigger.retry_params(defaults);
        let transport = RetryingTransport::new(params, cache, resolver.clone())?;
        Ok(Self {
            trigger: Arc::new(trigger),
            selector,
            resolver,
            transport,
        })
    }

    pub fn trigger(&self) -> &TriggerDefinition {
        &self.trigger
    }

    pub async fn handle(&self, req: &HttpRequest, body: Bytes) -> Result<HttpResponse, RouterError> {
        let function = self
            .selector
            .select(&self.trigger.function_reference)
            .cloned()
            .ok_or_else(|| RouterError::NoFunction(self.trigger.key()))?;

        // a cold start happens here, outside the retry budget
        let address = self.transport.backend_address(&function).await.map_err(|e| {
            log::error!("trigger {}: {}", self.trigger.key(), e);
            e
        })?;

        let head = *req.method() == actix_web::http::Method::HEAD;
        let request = proxy_request(req, body, &function)?;
        let (resp, served_by) = self
            .transport
            .round_trip(&function, address, &request)
            .await
            .map_err(|e| {
                log::error!("trigger {}: {}", self.trigger.key(), e);
                e
            })?;

        self.tap(function, served_by);
        Ok(into_http_response(resp, head))
    }

    // keep the backend from being reaped as idle, best effort
    fn tap(&self, function: FunctionIdentity, address: Url) {
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.tap(&function, &address).await {
                log::warn!("failed to tap {} for {}: {}", address, function, e);
            }
        });
    }
}

fn proxy_request(
    req: &HttpRequest,
    body: Bytes,
    function: &FunctionIdentity,
) -> Result<ProxyRequest, RouterError> {
    let method = Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| RouterError::BadRequest(e.to_string()))?;

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers().iter() {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case("host") {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_str().as_bytes())
            .map_err(|e| RouterError::BadRequest(e.to_string()))?;
        let value = HeaderValue::from_bytes(value.as_bytes())
            .map_err(|e| RouterError::BadRequest(e.to_string()))?;
        headers.append(name, value);
    }

    if let Some(peer) = req.peer_addr() {
        let mut chain: Vec<String> = headers
            .get_all(HEADER_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        chain.push(peer.ip().to_string());
        if let Ok(value) = HeaderValue::from_str(&chain.join(", ")) {
            headers.insert(HEADER_FORWARDED_FOR, value);
        }
    }

    let function_headers = [
        (HEADER_FUNCTION_NAME, Some(function.name.as_str())),
        (HEADER_FUNCTION_NAMESPACE, Some(function.namespace.as_str())),
        (HEADER_FUNCTION_RESOURCE_VERSION, function.resource_version.as_deref()),
    ];
    for (name, value) in function_headers {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }

    let path_and_query = match req.uri().path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => req.path().to_string(),
    };

    Ok(ProxyRequest {
        method,
        path_and_query,
        headers,
        body,
    })
}

// Streams the backend response back; status and headers pass through.
fn into_http_response(resp: reqwest::Response, head: bool) -> HttpResponse {
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let bodiless = head
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED;

    let mut builder = HttpResponse::build(status);
    for (name, value) in resp.headers() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        // actix frames a streamed body itself
        if *name == reqwest::header::CONTENT_LENGTH && !bodiless {
            continue;
        }
        builder.append_header((name.as_str(), value.as_bytes()));
    }

    if head {
        // the declared length, not the empty body reqwest hands back
        let declared = resp
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return match declared {
            Some(len) => builder.body(SizedStream::new(len, resp.bytes_stream())),
            None => builder.body(body::None::new()),
        };
    }
    if bodiless {
        return builder.body(body::None::new());
    }

    let length = resp.content_length();
    let stream = resp.bytes_stream();
    match length {
        Some(len) => builder.body(SizedStream::new(len, stream)),
        None => builder.streaming(stream),
    }
}
