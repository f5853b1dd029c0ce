use actix_web::http::header;
use actix_web::web::Bytes;
use actix_web::{HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::sync::Arc;

use super::backend_resolver::BackendResolver;
use super::function_handler::FunctionHandler;
use super::function_identity::FunctionIdentity;
use super::function_selector::{FunctionSelector, WeightedRandomSelector};
use super::retry_transport::RetryParams;
use super::router_error::RouterError;
use super::routing_table::{Routable, RouteSet, RoutingTable};
use super::service_cache::FunctionServiceCache;
use super::trigger::TriggerDefinition;

impl Routable for FunctionHandler {
    fn trigger(&self) -> &TriggerDefinition {
        FunctionHandler::trigger(self)
    }
}

/// Top-level dispatcher: routing table in front, one handler per trigger.
pub struct FunctionRouter {
    table: RoutingTable<FunctionHandler>,
    cache: Arc<FunctionServiceCache>,
    resolver: Arc<dyn BackendResolver>,
    selector: Arc<dyn FunctionSelector>,
    retry_defaults: RetryParams,
}

impl FunctionRouter {
    pub fn new(
        retry_defaults: RetryParams,
        cache: Arc<FunctionServiceCache>,
        resolver: Arc<dyn BackendResolver>,
    ) -> Self {
        Self {
            table: RoutingTable::new(),
            cache,
            resolver,
            selector: Arc::new(WeightedRandomSelector),
            retry_defaults,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn FunctionSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn cache(&self) -> &Arc<FunctionServiceCache> {
        &self.cache
    }

    /// Builds a new routing table from `triggers` and swaps it in.
    ///
    /// Handlers whose trigger kept the same resource version are reused so
    /// their connection pools survive. On error the old table stays.
    pub fn update_triggers(&self, triggers: Vec<TriggerDefinition>) -> Result<usize, RouterError> {
        let current = self.table.snapshot();
        let existing: HashMap<(String, String), Arc<FunctionHandler>> = current
            .routes()
            .iter()
            .filter(|h| !h.trigger().resource_version.is_empty())
            .map(|h| {
                let key = (h.trigger().key(), h.trigger().resource_version.clone());
                (key, h.clone())
            })
            .collect();

        let mut handlers = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            trigger.validate()?;
            let reuse = existing
                .get(&(trigger.key(), trigger.resource_version.clone()))
                .cloned();
            let handler = match reuse {
                Some(handler) => handler,
                None => Arc::new(FunctionHandler::new(
                    trigger,
                    self.retry_defaults,
                    self.cache.clone(),
                    self.resolver.clone(),
                    self.selector.clone(),
                )?),
            };
            handlers.push(handler);
        }

        let routes = RouteSet::build(handlers)?;
        let count = routes.len();
        self.table.replace(routes);
        log::info!("routing table updated: {} triggers", count);
        Ok(count)
    }

    pub fn triggers(&self) -> Vec<TriggerDefinition> {
        self.table
            .snapshot()
            .routes()
            .iter()
            .map(|h| h.trigger().clone())
            .collect()
    }

    /// Forgets the cached backend of a deleted function.
    pub fn remove_function(&self, function: &FunctionIdentity) -> bool {
        let removed = self.cache.remove(function);
        if removed {
            log::info!("removed {} from service cache", function);
        }
        removed
    }

    pub async fn dispatch(&self, req: &HttpRequest, body: Bytes) -> Result<HttpResponse, RouterError> {
        let host = request_host(req);
        let handler = self
            .table
            .match_request(req.method().as_str(), &host, req.path())
            .ok_or_else(|| RouterError::NoRoute {
                method: req.method().to_string(),
                host: host.clone(),
                path: req.path().to_string(),
            })?;
        handler.handle(req, body).await
    }
}

fn request_host(req: &HttpRequest) -> String {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default()
        .to_string()
}
