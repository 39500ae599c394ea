//! Connection cache keyed by configuration ID
//!
//! Every configuration ID owns one slot. A slot is inserted atomically the
//! first time the ID is asked for and filled by exactly one factory call;
//! concurrent callers wait on the same slot and observe the same handle.
//! Because a re-stored configuration gets a fresh ID, a slot is never
//! reused for a configuration it was not built from.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ephemera_splunk::SplunkApi;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Result;

type Slot = Arc<OnceCell<Arc<dyn SplunkApi>>>;

/// Live connections by configuration ID, with hit/miss tracking
#[derive(Default)]
pub struct ConnectionCache {
    slots: DashMap<String, Slot>,

    /// Lookups served by an initialized slot
    hits: AtomicU64,

    /// Lookups that had to wait for or run a factory
    misses: AtomicU64,

    /// Successful factory calls
    creations: AtomicU64,

    /// Slots removed by `invalidate` or `clear`
    evictions: AtomicU64,
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ConnectionCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection for `id`, built by `factory` if the slot is empty
    ///
    /// Exactly one concurrent caller runs `factory`; the others wait for
    /// its outcome. A failed factory leaves the slot empty and the next
    /// caller tries again with a fresh slot. The factory must not talk to the
    /// remote.
    pub async fn get_or_create<F>(&self, id: &str, factory: F) -> Result<Arc<dyn SplunkApi>>
    where
        F: FnOnce() -> Result<Arc<dyn SplunkApi>>,
    {
        // Clone the slot out so the map shard is not held across the await.
        let slot = Arc::clone(self.slots.entry(id.to_string()).or_default().value());

        if let Some(conn) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(conn));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let created = slot
            .get_or_try_init(|| async {
                let conn = factory()?;
                self.creations.fetch_add(1, Ordering::Relaxed);
                debug!(config_id = %id, "created cached connection");
                Ok::<_, crate::error::BrokerError>(conn)
            })
            .await;
        match created {
            Ok(conn) => Ok(Arc::clone(conn)),
            Err(e) => {
                // An empty slot left behind would count as cached.
                self.slots.remove_if(id, |_, current| {
                    Arc::ptr_eq(current, &slot) && !current.initialized()
                });
                Err(e)
            }
        }
    }

    /// Drop the slot of `id`; returns whether there was one
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.slots.remove(id).is_some();
        if removed {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(config_id = %id, "evicted cached connection");
        }
        removed
    }

    /// Whether a slot exists for `id`, initialized or not
    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every slot
    pub fn clear(&self) {
        let count = self.slots.len() as u64;
        self.slots.clear();
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            creations: self.creations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.slots.len(),
        }
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from an initialized slot
    pub hits: u64,

    /// Lookups that went through a factory
    pub misses: u64,

    /// Connections built
    pub creations: u64,

    /// Slots dropped
    pub evictions: u64,

    /// Current number of slots
    pub size: usize,
}

impl CacheStats {
    /// Hit ratio in `[0.0, 1.0]`; zero before the first lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrokerError;
    use ephemera_splunk::testing::FakeSplunk;
    use ephemera_splunk::{ClientParams, Connector, SplunkError};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn factory(fake: &FakeSplunk) -> impl FnOnce() -> Result<Arc<dyn SplunkApi>> + '_ {
        move || {
            let params = ClientParams::new("https://localhost:8089", "admin", "changeme")?;
            Ok(fake.connect(params)?)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_instance() {
        let fake = FakeSplunk::new();
        let cache = Arc::new(ConnectionCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let cache = Arc::clone(&cache);
            let fake = fake.clone();
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_create("cfg-1", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(5));
                        factory(&fake)()
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut conns = Vec::new();
        for task in tasks {
            conns.push(task.await.unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.connects(), 1);
        assert!(conns.iter().all(|c| Arc::ptr_eq(c, &conns[0])));
        assert_eq!(cache.stats().creations, 1);
    }

    #[tokio::test]
    async fn failed_factory_leaves_nothing_behind() {
        let fake = FakeSplunk::new();
        let cache = ConnectionCache::new();

        let err = cache
            .get_or_create("cfg-1", || {
                Err(BrokerError::RemoteApi {
                    source: SplunkError::Tls {
                        reason: "bad key".to_string(),
                    },
                })
            })
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BrokerError::RemoteApi { .. }));
        assert!(!cache.contains("cfg-1"));
        assert_eq!(cache.stats().size, 0);

        let conn = cache.get_or_create("cfg-1", factory(&fake)).await.unwrap();
        assert_eq!(conn.username(), "admin");
        assert_eq!(cache.stats().creations, 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_instance() {
        let fake = FakeSplunk::new();
        let cache = ConnectionCache::new();

        let first = cache.get_or_create("cfg-1", factory(&fake)).await.unwrap();
        let again = cache.get_or_create("cfg-1", factory(&fake)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        assert!(cache.invalidate("cfg-1"));
        assert!(!cache.invalidate("cfg-1"));
        let second = cache.get_or_create("cfg-1", factory(&fake)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 2,
                creations: 2,
                evictions: 1,
                size: 1,
            }
        );
    }

    #[tokio::test]
    async fn ids_are_independent() {
        let fake = FakeSplunk::new();
        let cache = ConnectionCache::new();
        let a = cache.get_or_create("a", factory(&fake)).await.unwrap();
        let b = cache.get_or_create("b", factory(&fake)).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }
}
