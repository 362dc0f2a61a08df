//! Query cache with single-flight de-duplication
//!
//! This module ensures that identical requests share ONE underlying fetch.
//! A lookup either serves a fresh entry, joins the fetch already in flight
//! for the same key, or becomes the leader and starts it.
//!
//! The leader's fetch runs in its own task, so dropping any caller (the one
//! that started it included) never cancels the result for the others. The
//! task gives up only when nobody is waiting any more.
//!
//! The state lock is a plain mutex that is never held across an await.

use dashkit_core::{DashError, FetchError, Result, CACHE_TTL};
use dashkit_types::PagedResult;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::cache_key::{CacheKey, KeyMaterial, SourceIdentity};

/// How a lookup treats existing entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Serve a fresh entry if there is one
    CacheFirst,
    /// Skip the entry but still join an in-flight fetch
    Refresh,
}

type Outcome = std::result::Result<Arc<PagedResult>, DashError>;

enum Plan {
    Wait(watch::Receiver<Option<Outcome>>),
    Lead {
        id: u64,
        tx: Arc<watch::Sender<Option<Outcome>>>,
        rx: watch::Receiver<Option<Outcome>>,
    },
    Alone,
}

struct CacheEntry {
    canonical: String,
    value: Arc<PagedResult>,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < ttl
    }
}

struct InFlight {
    id: u64,
    canonical: String,
    tx: Arc<watch::Sender<Option<Outcome>>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
}

impl CacheState {
    /// Drop the in-flight record if it still belongs to flight `id`
    fn finish_flight(&mut self, key: &CacheKey, id: u64) -> bool {
        if self.in_flight.get(key).is_some_and(|f| f.id == id) {
            self.in_flight.remove(key);
            true
        } else {
            false
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the in-flight record if the leader task ends without finishing
/// normally (panic or abort), so later callers don't join a dead flight.
struct FlightGuard {
    state: Arc<Mutex<CacheState>>,
    key: CacheKey,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if lock(&self.state).finish_flight(&self.key, self.id) {
            debug!("Flight {} for {} ended without a result", self.id, self.key);
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub joins: u64,
}

/// TTL cache of paged results with single-flight fetching
pub struct QueryCache {
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
    next_flight: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joins: AtomicU64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
            next_flight: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joins: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh cached value for exactly these parameters, without fetching
    pub fn get(&self, material: &KeyMaterial) -> Option<Arc<PagedResult>> {
        let state = lock(&self.state);
        state
            .entries
            .get(&material.key)
            .filter(|e| e.canonical == material.canonical && e.is_fresh(self.ttl, Instant::now()))
            .map(|e| Arc::clone(&e.value))
    }

    /// Serve from cache, join an in-flight fetch, or run `fetch` as leader.
    ///
    /// Successful results are stored; failures are handed to every attached
    /// caller and leave no entry behind.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        material: KeyMaterial,
        policy: FetchPolicy,
        fetch: F,
    ) -> Result<Arc<PagedResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PagedResult>> + Send + 'static,
    {
        let KeyMaterial { key, canonical } = material;
        // Building the future does no work until it is polled
        let future = fetch();

        let plan = {
            let mut state = lock(&self.state);

            if policy == FetchPolicy::CacheFirst {
                let now = Instant::now();
                let cached = state.entries.get(&key).map(|e| {
                    (
                        e.is_fresh(self.ttl, now),
                        e.canonical == canonical,
                        Arc::clone(&e.value),
                    )
                });
                match cached {
                    Some((true, true, value)) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        trace!("Cache hit for {}", key);
                        return Ok(value);
                    }
                    Some((false, _, _)) => {
                        trace!("Cache entry for {} expired", key);
                        state.entries.remove(&key);
                    }
                    _ => {}
                }
            }

            let joinable = state
                .in_flight
                .get(&key)
                .map(|f| (f.id, f.canonical == canonical, f.tx.subscribe()));
            match joinable {
                Some((id, true, rx)) => {
                    self.joins.fetch_add(1, Ordering::Relaxed);
                    debug!("Joining in-flight fetch {} for {}", id, key);
                    Plan::Wait(rx)
                }
                Some((_, false, _)) => {
                    // Digest collision with different parameters
                    warn!("Cache key collision on {}, fetching without cache", key);
                    Plan::Alone
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    let tx = Arc::new(tx);
                    state.in_flight.insert(
                        key.clone(),
                        InFlight {
                            id,
                            canonical: canonical.clone(),
                            tx: Arc::clone(&tx),
                        },
                    );
                    debug!("Starting fetch {} for {} ({:?})", id, key, policy);
                    Plan::Lead { id, tx, rx }
                }
            }
        };

        let mut rx = match plan {
            Plan::Wait(rx) => rx,
            Plan::Alone => return future.await.map(Arc::new),
            Plan::Lead { id, tx, rx } => {
                self.spawn_leader(key, canonical, id, tx, future);
                rx
            }
        };

        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(DashError::Fetch(FetchError::Abandoned)))
    }

    fn spawn_leader<Fut>(
        &self,
        key: CacheKey,
        canonical: String,
        id: u64,
        tx: Arc<watch::Sender<Option<Outcome>>>,
        fetch: Fut,
    ) where
        Fut: Future<Output = Result<PagedResult>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let guard = FlightGuard {
                state: Arc::clone(&state),
                key: key.clone(),
                id,
            };

            let result = tokio::select! {
                result = fetch => Some(result),
                _ = tx.closed() => None,
            };
            let Some(result) = result else {
                debug!("Fetch {} for {} abandoned, no callers left", id, key);
                return;
            };

            let outcome = {
                let mut state = lock(&state);
                // An invalidation while in flight unregisters the flight;
                // its result is still delivered but not cached.
                let still_current = state.finish_flight(&key, id);
                match result {
                    Ok(value) => {
                        let value = Arc::new(value);
                        if still_current {
                            state.entries.insert(
                                key.clone(),
                                CacheEntry {
                                    canonical,
                                    value: Arc::clone(&value),
                                    inserted_at: Instant::now(),
                                },
                            );
                            debug!("Stored result of fetch {} for {}", id, key);
                        }
                        Ok(value)
                    }
                    Err(e) => {
                        warn!("Fetch {} for {} failed: {}", id, key, e);
                        Err(e)
                    }
                }
            };
            drop(guard);
            tx.send_replace(Some(outcome));
        });
    }

    /// Drop one entry (and detach its in-flight fetch from the cache)
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = lock(&self.state);
        let removed = state.entries.remove(key).is_some();
        let detached = state.in_flight.remove(key).is_some();
        if removed || detached {
            debug!("Invalidated {}", key);
        }
        removed
    }

    /// Drop every entry of one source
    pub fn invalidate_source(&self, source: &SourceIdentity) -> usize {
        self.invalidate_where(|key| &key.source == source)
    }

    /// Drop every entry served by a remote connection
    pub fn invalidate_connection(&self, connection_id: u64) -> usize {
        self.invalidate_where(|key| key.source.connection_id() == Some(connection_id))
    }

    fn invalidate_where<P>(&self, matches: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|key, _| !matches(key));
        state.in_flight.retain(|key, _| !matches(key));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!("Invalidated {} cache entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.in_flight.clear();
        info!("Query cache cleared");
    }

    /// Remove expired entries; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|_, e| e.is_fresh(self.ttl, now));
        before - state.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock(&self.state);
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joins: self.joins.load(Ordering::Relaxed),
        }
    }

    /// Debug: print all entries and their ages
    pub fn debug_print_entries(&self) {
        let now = Instant::now();
        let state = lock(&self.state);
        info!(
            "=== Query cache ({} entries, {} in flight) ===",
            state.entries.len(),
            state.in_flight.len()
        );
        for (key, entry) in state.entries.iter() {
            info!(
                "  {} : rows={}, age={:?}",
                key,
                entry.value.items.len(),
                now.duration_since(entry.inserted_at)
            );
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache_key::derive_key;
    use dashkit_types::{DatasourceDescriptor, RequestParameters, UserParameters};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn material(route: &str, page: u32) -> KeyMaterial {
        derive_key(
            &DatasourceDescriptor::remote(1, route),
            &RequestParameters::page(page, 10),
            &UserParameters::new(),
        )
        .unwrap()
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Future<Output = Result<PagedResult>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(delay).await;
            Ok(PagedResult::from_items(vec![json!({ "call": n })]))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();
        let second = cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_fetch() {
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            joins.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                        counted(&calls, Duration::from_millis(100))
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for join in joins {
            results.push(join.await.unwrap().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "single-flight should perform one fetch");
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();

        tokio::time::advance(CACHE_TTL - Duration::from_secs(1)).await;
        cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Expiry counts from insertion, the hit above did not extend it
        tokio::time::advance(Duration::from_secs(2)).await;
        cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<PagedResult, _>(DashError::Fetch(FetchError::Network("reset".into())))
            }
        };
        let err = cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, failing)
            .await
            .unwrap_err();
        assert_eq!(err, DashError::Fetch(FetchError::Network("reset".into())));
        assert_eq!(cache.stats().entries, 0);

        cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_bypasses_entry_but_joins_in_flight() {
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                counted(&calls, Duration::ZERO)
            })
            .await
            .unwrap();

        let manual = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(material("/a", 1), FetchPolicy::Refresh, || {
                        counted(&calls, Duration::from_millis(100))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        let scheduled = cache
            .get_or_fetch(material("/a", 1), FetchPolicy::Refresh, || {
                counted(&calls, Duration::from_millis(100))
            })
            .await
            .unwrap();
        let manual = manual.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&manual, &scheduled));
        assert_eq!(scheduled.items[0]["call"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_one_caller_keeps_fetch_for_others() {
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let spawn_caller = |cache: Arc<QueryCache>, calls: Arc<AtomicUsize>| {
            tokio::spawn(async move {
                cache
                    .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                        counted(&calls, Duration::from_millis(100))
                    })
                    .await
            })
        };
        let leader = spawn_caller(Arc::clone(&cache), Arc::clone(&calls));
        tokio::task::yield_now().await;
        let follower = spawn_caller(Arc::clone(&cache), Arc::clone(&calls));
        tokio::task::yield_now().await;

        leader.abort();
        let result = follower.await.unwrap().unwrap();
        assert_eq!(result.items[0]["call"], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_abandoned_when_every_caller_is_gone() {
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let caller = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(material("/a", 1), FetchPolicy::CacheFirst, || {
                        counted(&calls, Duration::from_secs(10))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cache.stats().in_flight, 1);

        caller.abort();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stats = cache.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_invalidate_connection_only_touches_that_connection() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let other = derive_key(
            &DatasourceDescriptor::remote(2, "/a"),
            &RequestParameters::default(),
            &UserParameters::new(),
        )
        .unwrap();

        for m in [material("/a", 1), material("/b", 1), other.clone()] {
            cache
                .get_or_fetch(m, FetchPolicy::CacheFirst, || counted(&calls, Duration::ZERO))
                .await
                .unwrap();
        }
        assert_eq!(cache.stats().entries, 3);

        assert_eq!(cache.invalidate_connection(1), 2);
        assert!(cache.get(&other).is_some());
        assert!(cache.get(&material("/a", 1)).is_none());
        assert!(cache.invalidate(&other.key));
        assert_eq!(cache.stats().entries, 0);
    }
}
