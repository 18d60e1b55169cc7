use md5::{Digest, Md5};

/// Consistent-hash placement: MD5 of the key picks a start index into `backends`, then `rf`
/// consecutive backends (wrapping) form the replica set, primary first.
pub fn replica_set(key: &str, backends: &[String], rf: usize) -> Vec<String> {
    if backends.is_empty() {
        return Vec::new();
    }
    let rf = rf.min(backends.len()).max(1);
    let start = hash_index(key, backends.len());
    (0..rf)
        .map(|i| backends[(start + i) % backends.len()].clone())
        .collect()
}

fn hash_index(key: &str, n: usize) -> usize {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let value = u128::from_be_bytes(digest.into());
    (value % n as u128) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_backends_yields_empty_set() {
        assert!(replica_set("k", &[], 2).is_empty());
    }

    #[test]
    fn rf_is_clamped_to_backend_count() {
        let backends = vec!["a".to_string(), "b".to_string()];
        assert_eq!(replica_set("k", &backends, 5).len(), 2);
    }

    #[test]
    fn placement_is_deterministic() {
        let backends = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let first = replica_set("delivery:42", &backends, 2);
        let second = replica_set("delivery:42", &backends, 2);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0], first[1]);
    }

    #[test]
    fn wraps_around_the_ring() {
        let backends = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        // Any key's replica set is always `rf` distinct backends even if the start index is
        // the last element.
        for key in ["x", "y", "z", "delivery:1", "drone:9"] {
            let set = replica_set(key, &backends, 3);
            assert_eq!(set.len(), 3);
            let mut sorted = set.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }
}
