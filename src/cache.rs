//! Process-wide TTL caches with an injected clock.

use chrono::Utc;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Source of "now" in epoch milliseconds. Injected so cache expiry is
/// testable without sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

struct Entry<V> {
    value: V,
    stored_at_ms: i64,
}

/// A keyed cache whose entries expire a fixed wall-clock interval after they
/// were stored. Expiry is checked at read time; stale entries are simply
/// overwritten on the next put.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Mutex<HashMap<K, Entry<V>>>>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl_ms,
            clock,
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if self.clock.now_ms() - entry.stored_at_ms < self.ttl_ms => {
                debug!("Cache HIT");
                Some(entry.value.clone())
            }
            Some(_) => {
                debug!("Cache STALE");
                None
            }
            None => {
                debug!("Cache MISS");
                None
            }
        }
    }

    pub async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().await;
        debug!("Cache PUT");
        cache.insert(
            key,
            Entry {
                value,
                stored_at_ms: self.clock.now_ms(),
            },
        );
    }
}

#[cfg(test)]
pub mod testing {
    use super::Clock;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A clock that only moves when told to.
    pub struct FixedClock {
        now_ms: AtomicI64,
    }

    impl FixedClock {
        pub fn new(now_ms: i64) -> Self {
            Self {
                now_ms: AtomicI64::new(now_ms),
            }
        }

        pub fn advance_ms(&self, delta: i64) {
            self.now_ms.fetch_add(delta, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.now_ms.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedClock;
    use super::*;

    #[tokio::test]
    async fn test_cache_get_put() {
        let clock = Arc::new(FixedClock::new(0));
        let cache = TtlCache::<String, i32>::new(1_000, clock);

        assert!(cache.get(&"key1".to_string()).await.is_none());

        cache.put("key1".to_string(), 123).await;
        assert_eq!(cache.get(&"key1".to_string()).await, Some(123));

        assert!(cache.get(&"key2".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let clock = Arc::new(FixedClock::new(0));
        let cache = TtlCache::<String, i32>::new(1_000, Arc::clone(&clock) as Arc<dyn Clock>);

        cache.put("key".to_string(), 7).await;

        clock.advance_ms(999);
        assert_eq!(cache.get(&"key".to_string()).await, Some(7));

        clock.advance_ms(1);
        assert!(cache.get(&"key".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn test_put_refreshes_stale_entry() {
        let clock = Arc::new(FixedClock::new(0));
        let cache = TtlCache::<String, i32>::new(100, Arc::clone(&clock) as Arc<dyn Clock>);

        cache.put("key".to_string(), 1).await;
        clock.advance_ms(200);
        assert!(cache.get(&"key".to_string()).await.is_none());

        cache.put("key".to_string(), 2).await;
        assert_eq!(cache.get(&"key".to_string()).await, Some(2));
    }
}
