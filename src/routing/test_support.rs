// shared fakes for the routing tests
use async_trait::async_trait;
use reqwest::Url;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::backend_resolver::BackendResolver;
use super::function_identity::FunctionIdentity;
use super::router_error::RouterError;

/// Hands out `addresses` in order, repeating the last one.
/// With no addresses every call fails.
pub struct SequenceResolver {
    addresses: Vec<Url>,
    calls: AtomicUsize,
    taps: AtomicUsize,
}

impl SequenceResolver {
    pub fn new(addresses: Vec<Url>) -> Self {
        Self {
            addresses,
            calls: AtomicUsize::new(0),
            taps: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn taps(&self) -> usize {
        self.taps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendResolver for SequenceResolver {
    async fn resolve(&self, function: &FunctionIdentity) -> Result<Url, RouterError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.addresses
            .get(n)
            .or_else(|| self.addresses.last())
            .cloned()
            .ok_or_else(|| RouterError::Resolution(function.clone(), "no backend".into()))
    }

    async fn tap(&self, _function: &FunctionIdentity, _address: &Url) -> Result<(), RouterError> {
        self.taps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An address nothing listens on: the port was bound and released.
pub fn unreachable_address() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap()
}

/// A backend that accepts connections but never answers.
/// Keep the listener alive for as long as the address is used.
pub fn stalled_backend() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap())
}
