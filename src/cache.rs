//! Request dedup and short-lived result cache.
//!
//! Keyed by procedure name plus the canonical JSON of its params, so the key
//! already carries every filter value, time view and drill level that went
//! into the call. Identical keys share one in-flight request; completed
//! successes are reused until the TTL runs out. Failures are never cached.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::FetchError;
use crate::logging::{log_cache, params_hash};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, FetchError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    procedure: String,
    params: String,
}

impl RequestKey {
    pub fn new(procedure: &str, params: &Map<String, Value>) -> Self {
        // serde_json's default Map is ordered, so this is canonical
        Self {
            procedure: procedure.to_string(),
            params: Value::Object(params.clone()).to_string(),
        }
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn hash_hex(&self) -> String {
        params_hash(&format!("{}:{}", self.procedure, self.params))
    }
}

#[derive(Debug, Clone)]
struct CachedValue {
    value: Value,
    fetched_at: Instant,
}

impl CachedValue {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<RequestKey, CachedValue>>,
    in_flight: Mutex<HashMap<RequestKey, SharedFetch>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Return a fresh cached value, join an identical in-flight request, or
    /// start `fetch`.
    pub async fn get_or_fetch<F>(&self, key: RequestKey, fetch: F) -> Result<Value, FetchError>
    where
        F: FnOnce() -> BoxFuture<'static, Result<Value, FetchError>>,
    {
        if let Some(value) = self.lookup(&key) {
            log_cache("hit", key.procedure(), &key.hash_hex());
            return Ok(value);
        }

        let shared = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    log_cache("joined", key.procedure(), &key.hash_hex());
                    existing.clone()
                }
                None => {
                    log_cache("miss", key.procedure(), &key.hash_hex());
                    let started = fetch().shared();
                    in_flight.insert(key.clone(), started.clone());
                    started
                }
            }
        };

        let result = shared.clone().await;

        // whoever finishes first retires the in-flight entry
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(&key).is_some_and(|f| f.ptr_eq(&shared)) {
                in_flight.remove(&key);
                if let Ok(value) = &result {
                    let mut entries = lock(&self.entries);
                    // drop keys no caller asked for again within the TTL
                    entries.retain(|_, cached| cached.is_fresh(self.ttl));
                    entries.insert(
                        key,
                        CachedValue {
                            value: value.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                }
            }
        }

        result
    }

    fn lookup(&self, key: &RequestKey) -> Option<Value> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some(cached) if cached.is_fresh(self.ttl) => Some(cached.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn key(brand: &str) -> RequestKey {
        let mut params = Map::new();
        params.insert("p_brand".to_string(), json!(brand));
        RequestKey::new("get_sales_value_target", &params)
    }

    fn counting_fetch(counter: Arc<AtomicU32>, out: Value) -> BoxFuture<'static, Result<Value, FetchError>> {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(out)
        }
        .boxed()
    }

    #[test]
    fn test_key_is_param_order_independent() {
        let mut a = Map::new();
        a.insert("p_brand".to_string(), json!("x"));
        a.insert("p_division".to_string(), json!("y"));
        let mut b = Map::new();
        b.insert("p_division".to_string(), json!("y"));
        b.insert("p_brand".to_string(), json!("x"));
        assert_eq!(RequestKey::new("p", &a), RequestKey::new("p", &b));
        assert_ne!(RequestKey::new("p", &a), RequestKey::new("q", &a));
    }

    #[tokio::test]
    async fn test_identical_keys_share_one_request() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicU32::new(0));
        let (a, b) = tokio::join!(
            cache.get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(1))),
            cache.get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(2))),
        );
        assert_eq!(a.unwrap(), json!(1));
        assert_eq!(b.unwrap(), json!(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // completed value is reused
        let c = cache
            .get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(3)))
            .await;
        assert_eq!(c.unwrap(), json!(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_key_fetches_again() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let counter = Arc::new(AtomicU32::new(0));
        cache
            .get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(1)))
            .await
            .unwrap();
        let other = cache
            .get_or_fetch(key("Zen"), || counting_fetch(counter.clone(), json!(2)))
            .await
            .unwrap();
        assert_eq!(other, json!(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let failed = cache
            .get_or_fetch(key("Acme"), || {
                async {
                    Err(FetchError::Transport {
                        procedure: "get_sales_value_target".to_string(),
                        message: "down".to_string(),
                    })
                }
                .boxed()
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let counter = Arc::new(AtomicU32::new(0));
        let ok = cache
            .get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(7)))
            .await;
        assert_eq!(ok.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_insert_prunes_expired_keys() {
        let cache = QueryCache::new(Duration::from_millis(20));
        let counter = Arc::new(AtomicU32::new(0));
        cache
            .get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(1)))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache
            .get_or_fetch(key("Zen"), || counting_fetch(counter.clone(), json!(2)))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_refetch() {
        let cache = QueryCache::new(Duration::from_millis(0));
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            cache
                .get_or_fetch(key("Acme"), || counting_fetch(counter.clone(), json!(1)))
                .await
                .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
