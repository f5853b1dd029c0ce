use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::function_identity::{FunctionIdentity, DEFAULT_NAMESPACE};
use super::retry_transport::RetryParams;
use super::router_error::RouterError;

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Routing rule binding request patterns to a function or weighted group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub resource_version: String,
    pub match_rule: MatchRule,
    pub function_reference: FunctionReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRule {
    /// `None` matches any host, `*.example.com` one extra label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub path: PathMatch,
    /// Empty matches any method.
    #[serde(default)]
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FunctionReference {
    #[serde(rename = "name")]
    SingleFunction { function: FunctionIdentity },
    #[serde(rename = "weighted")]
    WeightedGroup { functions: Vec<WeightedFunction> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedFunction {
    pub function: FunctionIdentity,
    pub weight: u32,
}

/// Per-trigger overrides of the process-wide retry defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOverride {
    pub timeout_ms: Option<u64>,
    pub timeout_exponent: Option<f64>,
    pub keep_alive_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

impl RetryOverride {
    pub fn apply(&self, defaults: RetryParams) -> RetryParams {
        RetryParams {
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            timeout_exponent: self.timeout_exponent.unwrap_or(defaults.timeout_exponent),
            keep_alive: self
                .keep_alive_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.keep_alive),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

impl TriggerDefinition {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Retry parameters for this trigger, falling back to `defaults`.
    pub fn retry_params(&self, defaults: RetryParams) -> RetryParams {
        match &self.retry {
            Some(retry) => retry.apply(defaults),
            None => defaults,
        }
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        let invalid = |reason: &str| -> Result<(), RouterError> {
            Err(RouterError::InvalidTrigger(self.key(), reason.to_string()))
        };

        if self.name.is_empty() {
            return invalid("name must not be empty");
        }
        match &self.match_rule.path {
            PathMatch::Exact(p) | PathMatch::Prefix(p) if !p.starts_with('/') => {
                return invalid("path must start with '/'");
            }
            _ => {}
        }
        if let Some(host) = &self.match_rule.host {
            let bare = host.strip_prefix("*.").unwrap_or(host);
            if bare.is_empty() || bare.starts_with(':') || bare.contains('*') {
                return invalid("host must be a hostname or *.domain wildcard");
            }
        }
        for method in &self.match_rule.methods {
            if actix_web::http::Method::from_bytes(method.as_bytes()).is_err() {
                return invalid("invalid HTTP method");
            }
        }
        if let FunctionReference::WeightedGroup { functions } = &self.function_reference {
            if functions.iter().all(|f| f.weight == 0) {
                return invalid("weighted group needs at least one function with non-zero weight");
            }
        }
        self.retry_params(RetryParams::default()).validate()
    }
}
