//! Key hashing and bucket assignment.

use rapidhash::fast::RapidHasher;
use std::hash::{Hash, Hasher};

use crate::assert::spill_assert;

const DEFAULT_SEED: u64 = 1337;

/// Produces the hash code of an extracted key. Hash codes are signed and may be
/// negative; [`bucket_for_hash`] maps any of them into range.
pub trait KeyHasher<K: ?Sized> {
    fn hash_key(&self, key: &K) -> i64;
}

impl<K: ?Sized, F> KeyHasher<K> for F
where
    F: Fn(&K) -> i64,
{
    fn hash_key(&self, key: &K) -> i64 {
        self(key)
    }
}

/// Default hasher: feeds the key's [`Hash`] impl into a fixed-seed rapidhash and
/// reinterprets the 64-bit result as a signed hash code. Routing is therefore stable
/// across runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RapidKeyHasher;

impl<K: Hash + ?Sized> KeyHasher<K> for RapidKeyHasher {
    fn hash_key(&self, key: &K) -> i64 {
        let mut hasher = RapidHasher::new(DEFAULT_SEED);
        key.hash(&mut hasher);
        hasher.finish() as i64
    }
}

/// Maps a hash code to a bucket in `[0, partition_count)`, negative codes included.
#[inline]
pub fn bucket_for_hash(hash: i64, partition_count: usize) -> usize {
    spill_assert!(partition_count > 0, "partition count must be positive");
    hash.rem_euclid(partition_count as i64) as usize
}
