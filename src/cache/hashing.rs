//! Key routing: a keyed `ahash` hash of the key, reduced modulo the shard count.

use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;

#[inline]
fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
    let mut state = hasher.build_hasher();
    key.hash(&mut state);
    state.finish()
}

/// Maps keys to shard indexes.
///
/// The hash seed is drawn once at construction, so a key keeps its shard
/// for as long as the router lives.
#[derive(Debug, Clone)]
pub struct ShardRouter {
    hasher: RandomState,
    num_shards: usize,
}

impl ShardRouter {
    /// `num_shards` must be non-zero; the client validates this at construction.
    pub fn new(num_shards: usize) -> Self {
        Self::with_hasher(num_shards, RandomState::new())
    }

    pub fn with_hasher(num_shards: usize, hasher: RandomState) -> Self {
        Self { hasher, num_shards }
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Index of the shard owning `key`, in `0..num_shards`.
    #[inline]
    pub fn shard_index(&self, key: &str) -> usize {
        (hash_key(&self.hasher, key) % self.num_shards as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_index_is_deterministic_and_in_range() {
        let router = ShardRouter::new(7);
        for i in 0..1000 {
            let key = format!("key-{i}");
            let index = router.shard_index(&key);
            assert!(index < 7);
            assert_eq!(index, router.shard_index(&key));
        }
    }

    #[test]
    fn test_single_shard_takes_everything() {
        let router = ShardRouter::new(1);
        assert_eq!(router.shard_index("anything"), 0);
        assert_eq!(router.shard_index(""), 0);
    }

    #[test]
    fn test_same_seed_routes_identically() {
        let a = ShardRouter::with_hasher(16, RandomState::with_seeds(1, 2, 3, 4));
        let b = ShardRouter::with_hasher(16, RandomState::with_seeds(1, 2, 3, 4));
        for i in 0..100 {
            let key = format!("user-{i}");
            assert_eq!(a.shard_index(&key), b.shard_index(&key));
        }
    }

    #[test]
    fn test_spreads_keys_over_all_shards() {
        let router = ShardRouter::new(8);
        let mut counts = [0usize; 8];
        for i in 0..8000 {
            counts[router.shard_index(&format!("key-{i}"))] += 1;
        }
        for count in counts {
            assert!((800..1200).contains(&count), "uneven shard load: {counts:?}");
        }
    }
}
