//! Matches inbound requests to triggers.
//!
//! Precedence: exact path > longer prefix, then exact host > wildcard >
//! any host, then an explicit method list > any method. Two triggers that
//! would tie are rejected when the table is built.

use arc_swap::ArcSwap;
use std::sync::Arc;

use super::router_error::RouterError;
use super::trigger::{MatchRule, PathMatch, TriggerDefinition};

/// Anything the table can route to.
pub trait Routable {
    fn trigger(&self) -> &TriggerDefinition;
}

impl Routable for TriggerDefinition {
    fn trigger(&self) -> &TriggerDefinition {
        self
    }
}

// (path kind, path length, host kind, method kind), higher wins
type MatchScore = (u8, usize, u8, u8);

/// An immutable, validated set of routes.
pub struct RouteSet<T> {
    routes: Vec<Arc<T>>,
}

impl<T: Routable> RouteSet<T> {
    pub fn empty() -> Self {
        Self { routes: Vec::new() }
    }

    /// Validates `routes` and rejects any pair that could tie on a request.
    pub fn build(routes: Vec<Arc<T>>) -> Result<Self, RouterError> {
        for route in &routes {
            route.trigger().validate()?;
        }
        for (i, a) in routes.iter().enumerate() {
            for b in &routes[i + 1..] {
                if rules_conflict(&a.trigger().match_rule, &b.trigger().match_rule) {
                    return Err(RouterError::ConflictingTriggers(
                        a.trigger().key(),
                        b.trigger().key(),
                    ));
                }
            }
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Arc<T>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the most specific route for the request.
    pub fn find(&self, method: &str, host: &str, path: &str) -> Option<Arc<T>> {
        let host = normalize_host(host);
        let mut best: Option<(MatchScore, &Arc<T>)> = None;

        for route in &self.routes {
            let Some(score) = match_score(&route.trigger().match_rule, method, &host, path) else {
                continue;
            };
            let is_better = match &best {
                None => true,
                Some((best_score, _)) => score > *best_score,
            };
            if is_better {
                best = Some((score, route));
            }
        }

        best.map(|(_, route)| route.clone())
    }
}

/// Lock-free holder of the current route set.
///
/// Readers load a snapshot; `replace` swaps the whole set at once so no
/// reader ever sees a partially updated table.
pub struct RoutingTable<T> {
    current: ArcSwap<RouteSet<T>>,
}

impl<T: Routable> RoutingTable<T> {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RouteSet::empty()),
        }
    }

    pub fn replace(&self, routes: RouteSet<T>) {
        self.current.store(Arc::new(routes));
    }

    pub fn snapshot(&self) -> Arc<RouteSet<T>> {
        self.current.load_full()
    }

    pub fn match_request(&self, method: &str, host: &str, path: &str) -> Option<Arc<T>> {
        self.current.load().find(method, host, path)
    }
}

impl<T: Routable> Default for RoutingTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn match_score(rule: &MatchRule, method: &str, host: &str, path: &str) -> Option<MatchScore> {
    let (path_kind, path_len) = path_score(&rule.path, path)?;
    let host_kind = host_score(rule.host.as_deref(), host)?;
    let method_kind = method_score(&rule.methods, method)?;
    Some((path_kind, path_len, host_kind, method_kind))
}

fn path_score(pattern: &PathMatch, path: &str) -> Option<(u8, usize)> {
    match pattern {
        PathMatch::Exact(p) if p == path => Some((2, p.len())),
        PathMatch::Prefix(p) if prefix_matches(p, path) => Some((1, p.len())),
        _ => None,
    }
}

/// Prefix matching on segment boundaries:
/// `/api` matches `/api` and `/api/users` but not `/apikeys`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    if path.len() == prefix.len() || prefix.ends_with('/') {
        return true;
    }
    path.as_bytes()[prefix.len()] == b'/'
}

fn host_score(pattern: Option<&str>, host: &str) -> Option<u8> {
    let Some(pattern) = pattern else {
        return Some(0);
    };
    // a port in the pattern is ignored just like one in the request
    let pattern = normalize_host(pattern);
    match pattern.strip_prefix('*') {
        // *.example.com matches foo.example.com, not example.com or a.b.example.com
        Some(suffix) => {
            let label = host.strip_suffix(suffix)?;
            (!label.is_empty() && !label.contains('.')).then_some(1)
        }
        None => (host == pattern).then_some(2),
    }
}

fn method_score(methods: &[String], method: &str) -> Option<u8> {
    if methods.is_empty() {
        return Some(0);
    }
    methods
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
        .then_some(1)
}

fn normalize_host(host: &str) -> String {
    // bracketed IPv6 literals keep their colons
    let host = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or(rest),
        None => host.split(':').next().unwrap_or(host),
    };
    host.to_ascii_lowercase()
}

fn rules_conflict(a: &MatchRule, b: &MatchRule) -> bool {
    if a.path != b.path {
        return false;
    }
    let host_a = a.host.as_deref().map(normalize_host);
    let host_b = b.host.as_deref().map(normalize_host);
    if host_a != host_b {
        return false;
    }
    match (a.methods.is_empty(), b.methods.is_empty()) {
        (true, true) => true,
        (false, false) => a
            .methods
            .iter()
            .any(|m| b.methods.iter().any(|n| m.eq_ignore_ascii_case(n))),
        _ => false,
    }
}
