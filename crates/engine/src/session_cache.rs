//! Bounded, time-expiring per-session cache.
//!
//! An explicit map `session_id -> (value, inserted_at)` instead of a global
//! lazily-filled registry. Time is always passed in, so expiry is testable
//! without sleeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use vocalis_config::SessionCacheConfig;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

/// Return the live entry for `key`, creating it with `make` if it is missing
/// or older than `ttl`.
pub fn get_or_create<'a, V>(
    map: &'a mut HashMap<String, CacheEntry<V>>,
    key: &str,
    now: Instant,
    ttl: Duration,
    make: impl FnOnce() -> V,
) -> &'a mut V {
    let expired = map
        .get(key)
        .is_some_and(|e| now.saturating_duration_since(e.inserted_at) > ttl);
    if expired {
        map.remove(key);
    }

    &mut map
        .entry(key.to_string())
        .or_insert_with(|| CacheEntry {
            value: make(),
            inserted_at: now,
        })
        .value
}

/// Drop every entry older than `ttl`. Returns how many were dropped.
pub fn evict_expired<V>(map: &mut HashMap<String, CacheEntry<V>>, now: Instant, ttl: Duration) -> usize {
    let before = map.len();
    map.retain(|_, e| now.saturating_duration_since(e.inserted_at) <= ttl);
    before - map.len()
}

/// A capacity-bounded session cache.
#[derive(Debug)]
pub struct SessionCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<V> SessionCache<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &SessionCacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_or_create(&mut self, key: &str, now: Instant, make: impl FnOnce() -> V) -> &mut V {
        if !self.entries.contains_key(key) {
            self.make_room(now);
        }
        get_or_create(&mut self.entries, key, now, self.ttl, make)
    }

    /// Take the live value for `key` out of the cache.
    pub fn checkout(&mut self, key: &str, now: Instant) -> Option<V> {
        let entry = self.entries.remove(key)?;
        if now.saturating_duration_since(entry.inserted_at) > self.ttl {
            debug!(session = key, "Cached session expired");
            return None;
        }
        Some(entry.value)
    }

    /// Put a value (back) into the cache, refreshing its timestamp.
    pub fn checkin(&mut self, key: impl Into<String>, value: V, now: Instant) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.make_room(now);
        }
        self.entries.insert(key, CacheEntry { value, inserted_at: now });
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|e| e.value)
    }

    pub fn evict_expired(&mut self, now: Instant) -> usize {
        evict_expired(&mut self.entries, now, self.ttl)
    }

    fn make_room(&mut self, now: Instant) {
        if self.entries.len() < self.capacity {
            return;
        }
        let expired = self.evict_expired(now);
        if expired > 0 {
            debug!(expired, "Evicted expired sessions");
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            debug!(session = %oldest, "Session cache full, evicting oldest");
            self.entries.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn creates_once_while_fresh() {
        let mut map = HashMap::new();
        let t0 = Instant::now();
        *get_or_create(&mut map, "s1", t0, TTL, || 1) += 10;
        let v = get_or_create(&mut map, "s1", t0 + Duration::from_secs(30), TTL, || 99);
        assert_eq!(*v, 11);
    }

    #[test]
    fn recreates_after_ttl() {
        let mut map = HashMap::new();
        let t0 = Instant::now();
        get_or_create(&mut map, "s1", t0, TTL, || 1);
        let v = get_or_create(&mut map, "s1", t0 + Duration::from_secs(61), TTL, || 2);
        assert_eq!(*v, 2);
    }

    #[test]
    fn evicts_only_expired() {
        let mut map = HashMap::new();
        let t0 = Instant::now();
        get_or_create(&mut map, "old", t0, TTL, || ());
        get_or_create(&mut map, "new", t0 + Duration::from_secs(50), TTL, || ());
        assert_eq!(evict_expired(&mut map, t0 + Duration::from_secs(90), TTL), 1);
        assert!(map.contains_key("new"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = SessionCache::new(TTL, 2);
        let t0 = Instant::now();
        cache.checkin("a", 1, t0);
        cache.checkin("b", 2, t0 + Duration::from_secs(1));
        cache.checkin("c", 3, t0 + Duration::from_secs(2));
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn checkout_removes_and_respects_ttl() {
        let mut cache = SessionCache::new(TTL, 4);
        let t0 = Instant::now();
        cache.checkin("s1", "window", t0);

        assert_eq!(cache.checkout("s1", t0 + Duration::from_secs(5)), Some("window"));
        assert!(cache.checkout("s1", t0).is_none());

        cache.checkin("s1", "window", t0);
        assert!(cache.checkout("s1", t0 + Duration::from_secs(120)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn refreshing_existing_key_does_not_evict() {
        let mut cache = SessionCache::new(TTL, 2);
        let t0 = Instant::now();
        cache.checkin("a", 1, t0);
        cache.checkin("b", 2, t0);
        cache.checkin("a", 3, t0 + Duration::from_secs(1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.remove("a"), Some(3));
    }
}
