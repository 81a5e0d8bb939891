use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Capacity-bounded, time-boxed cache. A zero TTL or zero capacity disables it.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Option<Arc<Mutex<LruCache<K, (Instant, V)>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let entries = NonZeroUsize::new(capacity)
            .filter(|_| !ttl.is_zero())
            .map(|cap| Arc::new(Mutex::new(LruCache::new(cap))));
        Self { ttl, entries }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.as_ref()?;
        let mut cache = entries.lock().ok()?;

        let hit = cache
            .get(key)
            .map(|(stored, value)| (stored.elapsed() < self.ttl, value.clone()));
        match hit {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value`, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        if let Some(entries) = &self.entries {
            if let Ok(mut cache) = entries.lock() {
                cache.put(key, (Instant::now(), value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .and_then(|entries| entries.lock().ok().map(|cache| cache.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
