use std::num::NonZeroUsize;
use std::sync::Mutex;

use alloy_primitives::B256;
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Cache-aside store for the read path. Values are entities serialized as
/// JSON text under `"<kind>_<id>"` keys; nothing expires on write, entries
/// only leave by LRU eviction.
pub struct ReadCache {
    entries: Mutex<LruCache<String, String>>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero cache capacity");
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        let raw = entries.get(key)?;
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                eprintln!("[cache] dropping undecodable entry {key}: {e}");
                entries.pop(key);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                self.entries.lock().unwrap().put(key.to_string(), raw);
            }
            Err(e) => eprintln!("[cache] failed to serialize {key}: {e}"),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn header_key(height: u64) -> String {
    format!("header_{height}")
}

pub fn block_key(height: u64) -> String {
    format!("block_{height}")
}

pub fn tx_key(hash: &B256) -> String {
    format!("tx_{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_put_miss_before() {
        let cache = ReadCache::new(8);
        assert_eq!(cache.get::<u64>(&block_key(5)), None);
        cache.put(&block_key(5), &42u64);
        assert_eq!(cache.get::<u64>(&block_key(5)), Some(42));
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = ReadCache::new(2);
        cache.put("a", &1u64);
        cache.put("b", &2u64);
        cache.put("c", &3u64);
        assert_eq!(cache.get::<u64>("a"), None);
        assert_eq!(cache.get::<u64>("b"), Some(2));
        assert_eq!(cache.get::<u64>("c"), Some(3));
    }

    #[test]
    fn key_formats() {
        assert_eq!(header_key(7), "header_7");
        assert_eq!(block_key(7), "block_7");
        let hash = B256::ZERO;
        assert!(tx_key(&hash).starts_with("tx_0x"));
    }
}
