//! Time-to-live cache shared by the fingerprint service and the data loader.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Map whose entries expire `ttl` after insertion.
///
/// Expired entries are dropped lazily on lookup.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns a clone of the entry if it has not expired.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let fresh = match self.entries.get(key) {
            Some((inserted, _)) => inserted.elapsed() < self.ttl,
            None => return None,
        };

        if fresh {
            self.entries.get(key).map(|(_, v)| v.clone())
        } else {
            self.entries.remove(key);
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops every entry matching `predicate`.
    pub fn retain(&mut self, mut predicate: impl FnMut(&K) -> bool) {
        self.entries.retain(|k, _| predicate(k));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("2019", "abc".to_string());
        assert_eq!(cache.get(&"2019").as_deref(), Some("abc"));
    }

    #[test]
    fn test_zero_ttl_always_expires() {
        let mut cache = TtlCache::new(Duration::ZERO);
        cache.insert(1, 10);
        assert_eq!(cache.get(&1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_retain_and_clear() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.insert(1, 'a');
        cache.insert(2, 'b');
        cache.retain(|k| *k != 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), None);

        cache.clear();
        assert!(cache.is_empty());
    }
}
