// service_cache.rs: function identity -> backend address
use dashmap::DashMap;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::function_identity::FunctionIdentity;

struct ServiceEntry {
    address: Url,
    created: Instant,
    // logical clock value of the latest hit, drives LRU eviction
    last_access: AtomicU64,
}

impl ServiceEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        match ttl {
            Some(ttl) => self.created.elapsed() > ttl,
            None => false,
        }
    }
}

/// Shared map from function identity to the address of its running backend.
///
/// Entries expire `ttl` after they were assigned. When `capacity` is non-zero
/// and an insert pushes the map over it, the least recently looked-up entry is
/// evicted. A zero capacity leaves only TTL eviction active; a zero TTL
/// disables expiry altogether.
pub struct FunctionServiceCache {
    cache: DashMap<FunctionIdentity, ServiceEntry>,
    ttl: Option<Duration>,
    capacity: usize,
    clock: AtomicU64,
}

impl FunctionServiceCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            cache: DashMap::new(),
            ttl: if ttl.is_zero() { None } else { Some(ttl) },
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Inserts or overwrites the backend address for `function`.
    pub fn assign(&self, function: &FunctionIdentity, address: Url) {
        let entry = ServiceEntry {
            address,
            created: Instant::now(),
            last_access: AtomicU64::new(self.tick()),
        };
        self.cache.insert(function.clone(), entry);

        if self.capacity > 0 {
            self.evict_over_capacity(function);
        }
    }

    /// Returns the cached address and refreshes its recency.
    ///
    /// `None` is a plain miss. Expired entries are dropped on the way out.
    pub fn lookup(&self, function: &FunctionIdentity) -> Option<Url> {
        {
            let entry = self.cache.get(function)?;
            if !entry.is_expired(self.ttl) {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                return Some(entry.address.clone());
            }
        }
        // re-check under the write lock, a fresh assign may have landed
        self.cache
            .remove_if(function, |_, entry| entry.is_expired(self.ttl));
        None
    }

    /// Removes the entry only while it still points at `address`.
    ///
    /// Returns true when an entry was removed.
    pub fn invalidate(&self, function: &FunctionIdentity, address: &Url) -> bool {
        self.cache
            .remove_if(function, |_, entry| &entry.address == address)
            .is_some()
    }

    /// Unconditionally forgets `function`, used when the function is deleted.
    pub fn remove(&self, function: &FunctionIdentity) -> bool {
        self.cache.remove(function).is_some()
    }

    /// Drops every entry older than the TTL and returns how many went.
    pub fn sweep_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.is_expired(self.ttl));
        before.saturating_sub(self.cache.len())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Runs `sweep_expired` every `period` until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    log::debug!("service cache sweep evicted {} entries", removed);
                }
            }
        })
    }

    fn evict_over_capacity(&self, keep: &FunctionIdentity) {
        while self.cache.len() > self.capacity {
            let victim = self
                .cache
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
                .map(|entry| (entry.key().clone(), entry.value().address.clone()));

            match victim {
                Some((function, address)) => {
                    log::debug!("service cache full, evicting {} ({})", function, address);
                    self.invalidate(&function, &address);
                }
                None => break,
            }
        }
    }
}
