//! Short-TTL response cache with in-flight request coalescing.
//!
//! For every key at most one upstream fetch is in flight at any instant.
//! The fetch runs on a detached task, so a caller that goes away does not
//! cancel it; every caller that observed the same miss window receives the
//! same outcome through a shared `watch` channel. Failures are handed to the
//! waiters and never stored.

use super::key::CacheKey;
use crate::error::{Provider, UpstreamError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

type Outcome<V> = Result<Arc<V>, UpstreamError>;

/// A stored value. Never mutated after creation; a refresh replaces it.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: Arc<V>,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// An upstream fetch that is currently underway for one key.
struct InFlight<V> {
    id: u64,
    outcome: watch::Sender<Option<Outcome<V>>>,
    /// Callers that attached over the fetch's lifetime, leader included.
    /// Not decremented when a caller gives up early.
    attached: usize,
    started_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that attached to an already running fetch.
    pub coalesced: u64,
    pub fetches: u64,
    pub failures: u64,
    pub evictions: u64,
    pub entries: usize,
    pub in_flight: usize,
}

struct Store<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    in_flight: HashMap<CacheKey, InFlight<V>>,
    stats: CacheStats,
    next_fetch_id: u64,
}

impl<V> Store<V> {
    /// Live value for `key`, evicting it first if it has expired.
    fn live(&mut self, key: &CacheKey, now: Instant) -> Option<Arc<V>> {
        let entry = self.entries.get(key)?;
        if entry.is_live(now) {
            return Some(Arc::clone(&entry.value));
        }
        self.entries.remove(key);
        self.stats.evictions += 1;
        None
    }

    /// Remove the in-flight marker, but only if it still belongs to fetch `id`.
    fn take_flight(&mut self, key: &CacheKey, id: u64) -> Option<InFlight<V>> {
        match self.in_flight.get(key) {
            Some(flight) if flight.id == id => self.in_flight.remove(key),
            _ => None,
        }
    }
}

/// What a caller does after the locked check-then-act step.
enum Role<V> {
    Hit(Arc<V>),
    Waiter(watch::Receiver<Option<Outcome<V>>>),
    Leader(watch::Receiver<Option<Outcome<V>>>, u64),
}

/// Keyed freshness cache. Cheap to clone; clones share the same store.
pub struct FreshnessCache<V> {
    provider: Provider,
    fetch_timeout: Duration,
    store: Arc<Mutex<Store<V>>>,
}

impl<V> Clone for FreshnessCache<V> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider,
            fetch_timeout: self.fetch_timeout,
            store: Arc::clone(&self.store),
        }
    }
}

impl<V: Send + Sync + 'static> FreshnessCache<V> {
    /// `provider` labels timeout errors; `fetch_timeout` bounds every fetch.
    pub fn new(provider: Provider, fetch_timeout: Duration) -> Self {
        Self {
            provider,
            fetch_timeout,
            store: Arc::new(Mutex::new(Store {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
                next_fetch_id: 0,
            })),
        }
    }

    /// Return the live value for `key`, join the fetch already running for
    /// it, or start one with `fetch` and cache its success for `ttl`.
    ///
    /// `fetch` is only invoked when this caller becomes the leader for a miss.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Arc<V>, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let role = self.claim(&key);
        let mut receiver = match role {
            Role::Hit(value) => {
                debug!(key = %key, "cache hit");
                return Ok(value);
            }
            Role::Waiter(receiver) => {
                debug!(key = %key, "joined in-flight fetch");
                receiver
            }
            Role::Leader(receiver, id) => {
                debug!(key = %key, "cache miss, fetching");
                // The guard exists before `fetch` runs, so a panicking
                // closure still clears the in-flight marker.
                let guard = FlightGuard {
                    store: Arc::clone(&self.store),
                    key: key.clone(),
                    id,
                    settled: false,
                };
                let future = fetch();
                self.spawn_fetch(guard, ttl, future);
                receiver
            }
        };

        let settled = receiver.wait_for(Option::is_some).await;
        match settled {
            Ok(outcome) => (*outcome).clone().unwrap_or_else(|| Err(self.abandoned())),
            Err(_) => Err(self.abandoned()),
        }
    }

    /// The atomic check-then-act step: live entry, running fetch, or register
    /// a new fetch. The lock is never held across an await.
    fn claim(&self, key: &CacheKey) -> Role<V> {
        let mut store = self.store.lock();
        let now = Instant::now();

        if let Some(value) = store.live(key, now) {
            store.stats.hits += 1;
            return Role::Hit(value);
        }

        if let Some(flight) = store.in_flight.get_mut(key) {
            flight.attached += 1;
            let receiver = flight.outcome.subscribe();
            store.stats.coalesced += 1;
            return Role::Waiter(receiver);
        }

        store.stats.misses += 1;
        store.stats.fetches += 1;
        store.next_fetch_id += 1;
        let id = store.next_fetch_id;
        let (sender, receiver) = watch::channel(None);
        store.in_flight.insert(
            key.clone(),
            InFlight {
                id,
                outcome: sender,
                attached: 1,
                started_at: now,
            },
        );
        Role::Leader(receiver, id)
    }

    fn spawn_fetch<Fut>(&self, mut guard: FlightGuard<V>, ttl: Duration, fetch: Fut)
    where
        Fut: Future<Output = Result<V, UpstreamError>> + Send + 'static,
    {
        let provider = self.provider;
        let timeout = self.fetch_timeout;

        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::timed_out(provider, timeout)),
            };
            guard.settle(result, ttl);
        });
    }

    fn abandoned(&self) -> UpstreamError {
        UpstreamError::unavailable(self.provider, "fetch was abandoned before completing")
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut store = self.store.lock();
        let now = Instant::now();
        let before = store.entries.len();
        store.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - store.entries.len();
        store.stats.evictions += removed as u64;
        removed
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` until aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(provider = %cache.provider, removed, "swept expired cache entries");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        CacheStats {
            entries: store.entries.len(),
            in_flight: store.in_flight.len(),
            ..store.stats
        }
    }

    /// Number of stored entries, live or not yet swept.
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the in-flight marker for one fetch. Settling publishes the outcome;
/// dropping without settling (panic, runtime shutdown) still clears the
/// marker, and waiters see the closed channel.
struct FlightGuard<V> {
    store: Arc<Mutex<Store<V>>>,
    key: CacheKey,
    id: u64,
    settled: bool,
}

impl<V> FlightGuard<V> {
    fn settle(&mut self, result: Result<V, UpstreamError>, ttl: Duration) {
        let now = Instant::now();
        let outcome = result.map(Arc::new);
        let flight = {
            let mut store = self.store.lock();
            let flight = store.take_flight(&self.key, self.id);
            match &outcome {
                Ok(value) => {
                    store.entries.insert(
                        self.key.clone(),
                        CacheEntry {
                            key: self.key.clone(),
                            value: Arc::clone(value),
                            stored_at: now,
                            expires_at: now + ttl,
                        },
                    );
                }
                Err(err) => {
                    store.stats.failures += 1;
                    warn!(key = %self.key, error = %err, "upstream fetch failed");
                }
            }
            flight
        };
        self.settled = true;

        if let Some(flight) = flight {
            debug!(
                key = %self.key,
                attached = flight.attached,
                elapsed_ms = flight.started_at.elapsed().as_millis() as u64,
                "fetch settled"
            );
            flight.outcome.send_replace(Some(outcome));
        }
    }
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut store = self.store.lock();
        if store.take_flight(&self.key, self.id).is_some() {
            store.stats.failures += 1;
            warn!(key = %self.key, "fetch abandoned, in-flight marker cleared");
        }
    }
}
