use std::collections::HashMap;
use std::sync::Mutex;

use ddc_common::lww::now_ts;

/// In-process map of key to expiry timestamp. Best-effort: a TTL lock is an optimization
/// layered on top of CAS, never the correctness barrier.
pub struct LockTable {
    expirations: Mutex<HashMap<String, f64>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            expirations: Mutex::new(HashMap::new()),
        }
    }

    /// Succeeds iff now >= the key's current expiry (or the key was never locked), then
    /// installs `now + ttl_sec`.
    pub fn acquire(&self, key: &str, ttl_sec: u64) -> (bool, Option<f64>) {
        let now = now_ts();
        let mut table = self.expirations.lock().expect("lock table mutex poisoned");
        let available = table.get(key).map(|&expiry| now >= expiry).unwrap_or(true);
        if !available {
            return (false, None);
        }
        let expires_at = now + ttl_sec as f64;
        table.insert(key.to_string(), expires_at);
        (true, Some(expires_at))
    }

    pub fn release(&self, key: &str) {
        self.expirations.lock().expect("lock table mutex poisoned").remove(key);
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_before_expiry_fails() {
        let t = LockTable::new();
        assert!(t.acquire("k", 60).0);
        assert!(!t.acquire("k", 60).0);
    }

    #[test]
    fn release_frees_the_key_immediately() {
        let t = LockTable::new();
        assert!(t.acquire("k", 60).0);
        t.release("k");
        assert!(t.acquire("k", 60).0);
    }

    #[test]
    fn expired_lock_can_be_reacquired() {
        let t = LockTable::new();
        assert!(t.acquire("k", 0).0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(t.acquire("k", 60).0);
    }
}
