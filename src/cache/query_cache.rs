// Single-flight LRU cache with lazy TTL expiry
use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::Result;

/// Cache key: a namespace (model version, result kind) plus normalized text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub text: String,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            text: text.into(),
        }
    }
}

/// Where a [`QueryCache::get_or_compute_where`] value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Fresh cached entry
    Hit,
    /// This caller started the computation
    Computed,
    /// Joined a computation another caller started
    Coalesced,
}

/// Counters exposed for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that joined an already running computation
    pub coalesced: u64,
    pub expirations: u64,
    pub evictions: u64,
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

type SharedCompute<V> = Shared<BoxFuture<'static, Result<V>>>;

struct CacheState<V> {
    entries: LruCache<CacheKey, CacheEntry<V>>,
    in_flight: HashMap<CacheKey, SharedCompute<V>>,
    stats: CacheStats,
}

struct CacheInner<V> {
    state: Mutex<CacheState<V>>,
    ttl: Duration,
    retain_stale: bool,
}

/// Concurrent memoizing cache.
///
/// Concurrent misses on one key share a single computation; every waiter
/// gets the same value or the same error. Failures are not stored.
pub struct QueryCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> CacheInner<V> {
    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        // entries are replaced whole, so a poisoned guard still holds consistent data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.inserted_at.elapsed() >= self.ttl
    }
}

impl<V> CacheInner<V>
where
    V: Clone,
{
    /// Fresh value for `key`, dropping it if expired (unless stale entries are retained)
    fn lookup_fresh(&self, state: &mut CacheState<V>, key: &CacheKey) -> Option<V> {
        let expired = match state.entries.get(key) {
            Some(entry) if !self.is_expired(entry) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            state.stats.expirations += 1;
            if !self.retain_stale {
                state.entries.pop(key);
            }
        }
        None
    }

    fn store(&self, state: &mut CacheState<V>, key: CacheKey, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
            if evicted != key {
                state.stats.evictions += 1;
            }
        }
    }

    fn complete(&self, key: &CacheKey, outcome: &Result<V>, keep: impl Fn(&V) -> bool) {
        let mut state = self.lock();
        state.in_flight.remove(key);
        match outcome {
            Ok(value) if keep(value) => self.store(&mut state, key.clone(), value.clone()),
            _ => {}
        }
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache bounded to `capacity` entries, each living for `ttl`
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::build(capacity, ttl, false)
    }

    /// Keep expired entries around (until LRU-evicted or replaced) so they can
    /// be served through [`QueryCache::peek_stale`]
    pub fn with_stale_retention(capacity: usize, ttl: Duration) -> Self {
        Self::build(capacity, ttl, true)
    }

    fn build(capacity: usize, ttl: Duration, retain_stale: bool) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    entries: LruCache::new(capacity),
                    in_flight: HashMap::new(),
                    stats: CacheStats::default(),
                }),
                ttl,
                retain_stale,
            }),
        }
    }

    /// Return the cached value for `key` or run `compute` exactly once for all
    /// concurrent callers of the same key.
    ///
    /// `compute` is invoked while the cache lock is held to build the future,
    /// so it must not touch this cache synchronously; the returned future runs
    /// without the lock.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.get_or_compute_where(key, compute, |_| true)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`QueryCache::get_or_compute`], but a successful value is stored
    /// only when `keep` accepts it. Every concurrent waiter still receives it.
    pub async fn get_or_compute_where<F, Fut, K>(
        &self,
        key: CacheKey,
        compute: F,
        keep: K,
    ) -> Result<(V, Lookup)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
        K: Fn(&V) -> bool + Send + 'static,
    {
        let (shared, lookup) = {
            let mut state = self.inner.lock();

            if let Some(value) = self.inner.lookup_fresh(&mut state, &key) {
                state.stats.hits += 1;
                tracing::debug!(namespace = %key.namespace, "cache hit");
                return Ok((value, Lookup::Hit));
            }

            let running = state.in_flight.get(&key).cloned();
            if let Some(running) = running {
                state.stats.coalesced += 1;
                (running, Lookup::Coalesced)
            } else {
                state.stats.misses += 1;
                let inner = Arc::clone(&self.inner);
                let task_key = key.clone();
                let computation = compute();
                let task = async move {
                    let outcome = computation.await;
                    inner.complete(&task_key, &outcome, keep);
                    outcome
                }
                .boxed()
                .shared();
                state.in_flight.insert(key, task.clone());
                (task, Lookup::Computed)
            }
        };

        shared.await.map(|value| (value, lookup))
    }

    /// Fresh value without computing
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.inner.lock();
        let value = self.inner.lookup_fresh(&mut state, key);
        if value.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        value
    }

    /// Any retained value, fresh or expired, without touching recency
    pub fn peek_stale(&self, key: &CacheKey) -> Option<V> {
        let state = self.inner.lock();
        state.entries.peek(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: V) {
        let mut state = self.inner.lock();
        self.inner.store(&mut state, key, value);
    }

    /// Drop every entry of one namespace, e.g. after a model version change
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let mut state = self.inner.lock();
        let doomed: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            state.entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computations currently running
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QueryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(text: &str) -> CacheKey {
        CacheKey::new("v1", text)
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let value = cache
                .get_or_compute(key("a"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_computation() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            let mut release_rx = release_rx.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key("hot"), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        while !*release_rx.borrow() {
                            if release_rx.changed().await.is_err() {
                                break;
                            }
                        }
                        Ok(42)
                    })
                    .await
            }));
        }

        // let every task register before the computation finishes
        while cache.stats().misses + cache.stats().coalesced < 16 {
            tokio::task::yield_now().await;
        }
        release_tx.send(true).unwrap();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 15);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_failure_and_nothing_is_stored() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Err::<u32, _>(QueryError::InferenceTimeout { duration_ms: 5 })
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_compute(key("x"), make(calls.clone())),
            cache.get_or_compute(key("x"), make(calls.clone())),
        );

        assert_eq!(a.unwrap_err(), QueryError::InferenceTimeout { duration_ms: 5 });
        assert_eq!(b.unwrap_err(), QueryError::InferenceTimeout { duration_ms: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        // failures are not cached: the next call computes again
        let value = cache.get_or_compute(key("x"), || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_rejected_values_reach_waiters_but_are_not_stored() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(13)
            }
        };
        let even_only = |v: &u32| v % 2 == 0;

        let (a, b) = tokio::join!(
            cache.get_or_compute_where(key("p"), make(calls.clone()), even_only),
            cache.get_or_compute_where(key("p"), make(calls.clone()), even_only),
        );

        assert_eq!(a.unwrap(), (13, Lookup::Computed));
        assert_eq!(b.unwrap(), (13, Lookup::Coalesced));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        cache.insert(key("p"), 14);
        let (value, lookup) = cache
            .get_or_compute_where(key("p"), make(calls.clone()), even_only)
            .await
            .unwrap();
        assert_eq!((value, lookup), (14, Lookup::Hit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_recomputes() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |cache: QueryCache<u32>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_compute(key("t"), move || async move {
                    Ok(calls.fetch_add(1, Ordering::SeqCst) as u32)
                })
                .await
                .unwrap()
        };

        assert_eq!(fetch(cache.clone(), calls.clone()).await, 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(fetch(cache.clone(), calls.clone()).await, 0);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(fetch(cache.clone(), calls.clone()).await, 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_retention() {
        let plain: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(1));
        let retaining: QueryCache<u32> = QueryCache::with_stale_retention(8, Duration::from_secs(1));

        for cache in [&plain, &retaining] {
            cache.insert(key("s"), 3);
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(plain.get(&key("s")), None);
        assert_eq!(plain.peek_stale(&key("s")), None);

        assert_eq!(retaining.get(&key("s")), None);
        assert_eq!(retaining.peek_stale(&key("s")), Some(3));
    }

    #[test]
    fn test_lru_eviction() {
        let cache: QueryCache<u32> = QueryCache::new(2, Duration::from_secs(60));
        cache.insert(key("a"), 1);
        cache.insert(key("b"), 2);
        // touch a so b becomes least recently used
        assert_eq!(cache.get(&key("a")), Some(1));
        cache.insert(key("c"), 3);

        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.get(&key("a")), Some(1));
        assert_eq!(cache.get(&key("c")), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_namespace() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        cache.insert(CacheKey::new("v1", "a"), 1);
        cache.insert(CacheKey::new("v1", "b"), 2);
        cache.insert(CacheKey::new("v2", "a"), 3);

        assert_eq!(cache.invalidate_namespace("v1"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&CacheKey::new("v2", "a")), Some(3));
    }

    #[test]
    fn test_keys_differ_by_namespace() {
        let cache: QueryCache<u32> = QueryCache::new(8, Duration::from_secs(60));
        cache.insert(CacheKey::new("old-model", "q"), 1);
        assert_eq!(cache.get(&CacheKey::new("new-model", "q")), None);
    }
}
