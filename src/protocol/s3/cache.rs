//! Bucket region cache shared by S3 clients.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Callback run after a region is cached, with `(bucket, region)`
pub type RegionListener = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Thread-safe bucket -> region map with insert listeners.
///
/// Not a global: construct one and hand it (usually behind an `Arc`) to every
/// client that should share discoveries. Listeners run synchronously on the
/// inserting thread, after the map lock is released.
pub struct RegionCache {
    regions: RwLock<HashMap<String, String>>,
    listeners: RwLock<Vec<RegionListener>>,
}

impl RegionCache {
    pub fn new() -> Self {
        Self {
            regions: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Cached region for a bucket
    pub fn get(&self, bucket: &str) -> Option<String> {
        self.regions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bucket)
            .cloned()
    }

    /// Record a bucket's region and notify listeners
    pub fn insert(&self, bucket: &str, region: &str) {
        self.regions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bucket.to_string(), region.to_string());

        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(bucket, region);
        }
    }

    /// Register a listener for future inserts
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.regions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_cache_new() {
        let cache = RegionCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.get("bucket"), None);
    }

    #[test]
    fn test_insert_and_overwrite() {
        let cache = RegionCache::default();
        cache.insert("bucket-a", "us-east-1");
        cache.insert("bucket-b", "eu-west-1");
        cache.insert("bucket-a", "us-west-2");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("bucket-a").as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_listeners_see_every_insert() {
        let cache = RegionCache::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        cache.subscribe(move |bucket, region| {
            sink.lock()
                .unwrap()
                .push(format!("{}={}", bucket, region));
        });
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        cache.subscribe(move |_, _| *counter.lock().unwrap() += 1);

        cache.insert("a", "r1");
        cache.insert("b", "r2");

        assert_eq!(*seen.lock().unwrap(), vec!["a=r1", "b=r2"]);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_listener_may_read_cache() {
        let cache = Arc::new(RegionCache::new());
        let observed = Arc::new(Mutex::new(None));

        let reader = Arc::clone(&cache);
        let sink = Arc::clone(&observed);
        cache.subscribe(move |bucket, _| {
            *sink.lock().unwrap() = reader.get(bucket);
        });
        cache.insert("bucket", "ap-south-1");

        assert_eq!(observed.lock().unwrap().as_deref(), Some("ap-south-1"));
    }
}
