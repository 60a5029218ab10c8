//! Read-through cache for the post listing/search endpoint.
//!
//! Keys are normalized query strings, values the serialized JSON bodies.
//! Entries expire after a fixed TTL; any write against posts, comments, or
//! tag links empties the cache, so search results never outlive an edit.

use moka::sync::Cache;
use std::time::Duration;

const MAX_ENTRIES: u64 = 1_000;

#[derive(Clone)]
pub struct ListingCache {
    inner: Cache<String, String>,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, body: String) {
        self.inner.insert(key, body);
    }

    pub fn invalidate(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl_then_expiry() {
        let cache = ListingCache::new(Duration::from_millis(50));
        cache.insert("posts?q=".to_string(), "[]".to_string());
        assert_eq!(cache.get("posts?q="), Some("[]".to_string()));

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("posts?q="), None);
    }

    #[test]
    fn invalidate_clears_every_key() {
        let cache = ListingCache::new(Duration::from_secs(300));
        cache.insert("posts?q=".to_string(), "[]".to_string());
        cache.insert("posts?q=rust".to_string(), "[]".to_string());

        cache.invalidate();

        assert_eq!(cache.get("posts?q="), None);
        assert_eq!(cache.get("posts?q=rust"), None);
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = ListingCache::new(Duration::from_secs(300));
        assert_eq!(cache.get("posts?q=unseen"), None);
    }
}
