use crate::agent::AgentVerdict;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Cache key: verdicts are pure functions of the model, its effort, the
/// plan, and the candidate game.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub model: String,
    pub effort: String,
    pub fingerprint: String,
    pub game_id: i64,
}

/// In-memory LRU over agent verdicts. Capacity zero disables caching
/// entirely; entries have no TTL.
pub struct AgentCache {
    inner: Option<Mutex<LruCache<CacheKey, AgentVerdict>>>,
}

impl AgentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|c| Mutex::new(LruCache::new(c))),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<AgentVerdict> {
        self.inner
            .as_ref()?
            .lock()
            .ok()?
            .get(key)
            .cloned()
    }

    pub fn put(&self, key: CacheKey, verdict: AgentVerdict) {
        if let Some(cache) = &self.inner {
            if let Ok(mut guard) = cache.lock() {
                guard.put(key, verdict);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(game_id: i64) -> CacheKey {
        CacheKey {
            model: "test-model".into(),
            effort: "low".into(),
            fingerprint: "abc".into(),
            game_id,
        }
    }

    #[test]
    fn zero_capacity_disables_the_cache() {
        let cache = AgentCache::new(0);
        cache.put(key(1), AgentVerdict::neutral());
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = AgentCache::new(2);
        cache.put(key(1), AgentVerdict::neutral());
        cache.put(key(2), AgentVerdict::neutral());
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), AgentVerdict::neutral());
        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(3)).is_some());
    }
}
