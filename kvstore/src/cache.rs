use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use ddc_common::error::Result;
use lru::LruCache;
use serde_json::Value;

use crate::store::DurableStore;

struct CacheState {
    cache: LruCache<String, Value>,
    sizes: HashMap<String, usize>,
    total_bytes: usize,
}

impl CacheState {
    fn value_size(value: &Value) -> usize {
        serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
    }

    fn evict_until_fits(&mut self, incoming: usize, max_bytes: usize) {
        while self.total_bytes + incoming > max_bytes {
            match self.cache.pop_lru() {
                Some((evicted_key, evicted_value)) => {
                    let size = self
                        .sizes
                        .remove(&evicted_key)
                        .unwrap_or_else(|| Self::value_size(&evicted_value));
                    self.total_bytes = self.total_bytes.saturating_sub(size);
                }
                None => break,
            }
        }
    }

    fn insert(&mut self, key: &str, value: Value, max_bytes: usize) {
        let size = Self::value_size(&value);
        if let Some(old_size) = self.sizes.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(old_size);
        }
        self.evict_until_fits(size, max_bytes);
        self.cache.put(key.to_string(), value);
        self.sizes.insert(key.to_string(), size);
        self.total_bytes += size;
    }
}

/// Write-through LRU cache in front of the durable store, bounded by both item count and a
/// total-byte budget so a handful of oversized values can't blow out memory even while under
/// the item cap.
pub struct CachedStore {
    store: DurableStore,
    max_bytes: usize,
    state: Mutex<CacheState>,
}

impl CachedStore {
    pub fn new(store: DurableStore, capacity: usize, max_bytes: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            store,
            max_bytes,
            state: Mutex::new(CacheState {
                cache: LruCache::new(cap),
                sizes: HashMap::new(),
                total_bytes: 0,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(hit) = self.state.lock().expect("cache mutex poisoned").cache.get(key) {
            return Ok(Some(hit.clone()));
        }
        let value = self.store.get(key)?;
        if let Some(ref v) = value {
            let mut state = self.state.lock().expect("cache mutex poisoned");
            state.insert(key, v.clone(), self.max_bytes);
        }
        Ok(value)
    }

    pub fn put(&self, key: &str, value: Value) -> Result<()> {
        self.store.put(key, &value)?;
        let mut state = self.state.lock().expect("cache mutex poisoned");
        state.insert(key, value, self.max_bytes);
        Ok(())
    }

    pub fn cas(&self, key: &str, old: Option<Value>, new: Value) -> Result<(bool, Option<Value>)> {
        let (ok, current) = self.store.cas(key, &old, &new)?;
        let mut state = self.state.lock().expect("cache mutex poisoned");
        if ok {
            state.insert(key, new, self.max_bytes);
        } else if let Some(ref cur) = current {
            state.insert(key, cur.clone(), self.max_bytes);
        }
        Ok((ok, current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_serves_from_cache_without_hitting_store_again() {
        let cached = CachedStore::new(DurableStore::open(":memory:").unwrap(), 16, 1 << 20);
        cached.put("k", json!(1)).unwrap();
        assert_eq!(cached.get("k").unwrap(), Some(json!(1)));
        assert_eq!(cached.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn cas_updates_cache_on_success() {
        let cached = CachedStore::new(DurableStore::open(":memory:").unwrap(), 16, 1 << 20);
        cached.put("k", json!(1)).unwrap();
        let (ok, _) = cached.cas("k", Some(json!(1)), json!(2)).unwrap();
        assert!(ok);
        assert_eq!(cached.get("k").unwrap(), Some(json!(2)));
    }

    #[test]
    fn byte_budget_evicts_oldest_entries_once_exceeded() {
        let cached = CachedStore::new(DurableStore::open(":memory:").unwrap(), 100, 64);
        let big = json!("x".repeat(40));
        cached.put("a", big.clone()).unwrap();
        cached.put("b", big.clone()).unwrap();
        cached.put("c", big).unwrap();

        let state = cached.state.lock().unwrap();
        assert!(state.total_bytes <= 64);
        assert!(!state.sizes.contains_key("a"));
        assert!(state.sizes.contains_key("c"));
    }
}
