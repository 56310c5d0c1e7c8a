//! A hash array mapped trie, used to shard directories with many children.
//!
//! A [Bucket] is a table of `fanout` slots. Each slot is either empty, holds a
//! single leaf, or a nested [Bucket] for names whose hash bits collided at this
//! depth. At each depth, `log2(fanout)` bits of the (infinite) hash of a name
//! select the slot.
//!
//! Whether a directory should be sharded at all is decided by the caller, the
//! bucket itself has no notion of being too small.
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

mod bitfield;
mod hasher;

pub use bitfield::{bitfield, is_set, popcount};
pub use hasher::{Blake3Hasher, HashFunction, Murmur3Hasher};
use hasher::InfiniteHash;

/// The default table width.
pub const DEFAULT_FANOUT: u64 = 256;

/// Beyond this depth, two names are assumed to collide on every bit, which
/// only happens with a broken hash function.
const MAX_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("hash function failed: {0}")]
    Failed(String),

    #[error("hash function returned an empty digest")]
    EmptyDigest,

    #[error("hash function returned digests of varying length ({0} != {1})")]
    InconsistentLength(usize, usize),

    #[error("hash bits exhausted for {0:?}")]
    Exhausted(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid fanout {0}, must be a power of two between 2 and 1024")]
pub struct InvalidFanout(pub u64);

/// The hash configuration shared by all buckets of one trie.
#[derive(Clone)]
pub struct BucketOptions {
    hash_fn: Arc<dyn HashFunction>,
    fanout: u64,
    bits: u32,
}

impl BucketOptions {
    pub fn new(hash_fn: Arc<dyn HashFunction>, fanout: u64) -> Result<Self, InvalidFanout> {
        Self::validate_fanout(fanout)?;

        Ok(Self {
            hash_fn,
            fanout,
            bits: fanout.trailing_zeros(),
        })
    }

    pub fn validate_fanout(fanout: u64) -> Result<(), InvalidFanout> {
        if !(2..=1024).contains(&fanout) || !fanout.is_power_of_two() {
            return Err(InvalidFanout(fanout));
        }
        Ok(())
    }

    pub fn fanout(&self) -> u64 {
        self.fanout
    }

    pub fn hash_type(&self) -> u64 {
        self.hash_fn.hash_type()
    }
}

impl std::fmt::Debug for BucketOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketOptions")
            .field("fanout", &self.fanout)
            .field("hash_type", &self.hash_type())
            .finish()
    }
}

/// A single leaf stored in a [Bucket].
pub struct Leaf<V> {
    key: String,
    value: V,
    hash: InfiniteHash,
}

impl<V> Leaf<V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

/// The content of an occupied slot.
pub enum Slot<V> {
    Leaf(Leaf<V>),
    Bucket(Box<Bucket<V>>),
}

pub struct Bucket<V> {
    options: BucketOptions,
    depth: usize,
    slots: BTreeMap<usize, Slot<V>>,
}

impl<V> Bucket<V> {
    pub fn new(options: BucketOptions) -> Self {
        Self::new_at(options, 0)
    }

    fn new_at(options: BucketOptions, depth: usize) -> Self {
        Self {
            options,
            depth,
            slots: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &BucketOptions {
        &self.options
    }

    /// Inserts a value, returning the previous value stored under this key.
    ///
    /// An error from the hash function may leave the bucket without the
    /// entry that collided with `key`. These errors are fatal for the trie.
    pub fn put(&mut self, key: impl Into<String>, value: V) -> Result<Option<V>, HashError> {
        let key = key.into();
        let hash = InfiniteHash::new(key.as_bytes(), self.options.hash_fn.clone())?;

        self.put_hashed(key, hash, value)
    }

    fn put_hashed(
        &mut self,
        key: String,
        mut hash: InfiniteHash,
        value: V,
    ) -> Result<Option<V>, HashError> {
        if self.depth >= MAX_DEPTH {
            return Err(HashError::Exhausted(key));
        }

        let index = hash.index_at(self.depth, self.options.bits)?;

        match self.slots.remove(&index) {
            None => {
                self.slots.insert(index, Slot::Leaf(Leaf { key, value, hash }));
                Ok(None)
            }
            Some(Slot::Leaf(mut leaf)) if leaf.key == key => {
                let previous = std::mem::replace(&mut leaf.value, value);
                self.slots.insert(index, Slot::Leaf(leaf));
                Ok(Some(previous))
            }
            Some(Slot::Leaf(existing)) => {
                // Both names share the bits at this depth, move them one level down.
                let mut child = Bucket::new_at(self.options.clone(), self.depth + 1);
                child.put_hashed(existing.key, existing.hash, existing.value)?;
                let previous = child.put_hashed(key, hash, value)?;

                self.slots.insert(index, Slot::Bucket(Box::new(child)));
                Ok(previous)
            }
            Some(Slot::Bucket(mut child)) => {
                let result = child.put_hashed(key, hash, value);
                self.slots.insert(index, Slot::Bucket(child));
                result
            }
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<&V>, HashError> {
        let mut hash = InfiniteHash::new(key.as_bytes(), self.options.hash_fn.clone())?;
        let mut bucket = self;

        loop {
            let index = hash.index_at(bucket.depth, bucket.options.bits)?;
            match bucket.slots.get(&index) {
                None => return Ok(None),
                Some(Slot::Leaf(leaf)) if leaf.key == key => return Ok(Some(&leaf.value)),
                Some(Slot::Leaf(_)) => return Ok(None),
                Some(Slot::Bucket(child)) => bucket = child,
            }
        }
    }

    /// Number of leaves in this bucket and all sub-buckets.
    pub fn leaf_count(&self) -> usize {
        self.slots
            .values()
            .map(|slot| match slot {
                Slot::Leaf(_) => 1,
                Slot::Bucket(child) => child.leaf_count(),
            })
            .sum()
    }

    /// Number of directly occupied slots.
    pub fn children_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the single leaf, if this bucket holds exactly one leaf and no
    /// sub-buckets.
    pub fn only_child(&self) -> Option<(&str, &V)> {
        if self.slots.len() != 1 {
            return None;
        }

        match self.slots.values().next() {
            Some(Slot::Leaf(leaf)) => Some((&leaf.key, &leaf.value)),
            _ => None,
        }
    }

    /// Iterates over all leaves, in ascending slot order, descending into
    /// sub-buckets in place.
    pub fn leaves<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a str, &'a V)> + 'a> {
        Box::new(self.slots.values().flat_map(
            |slot| -> Box<dyn Iterator<Item = (&'a str, &'a V)> + 'a> {
                match slot {
                    Slot::Leaf(leaf) => Box::new(std::iter::once((leaf.key.as_str(), &leaf.value))),
                    Slot::Bucket(child) => child.leaves(),
                }
            },
        ))
    }

    pub fn table_size(&self) -> u64 {
        self.options.fanout
    }

    /// The occupied slots and their index, in ascending order.
    pub fn compact_slots(&self) -> impl Iterator<Item = (usize, &Slot<V>)> {
        self.slots.iter().map(|(index, slot)| (*index, slot))
    }

    /// The bitfield marking the occupied slots of this bucket.
    pub fn bitfield(&self) -> Bytes {
        bitfield(self.slots.keys().copied(), self.options.fanout)
    }
}

#[cfg(test)]
mod tests {
    use super::{Bucket, BucketOptions, HashError, InvalidFanout, Murmur3Hasher, Slot};
    use crate::fixtures::{ConstantHasher, IdentityHasher};
    use rstest::rstest;
    use std::sync::Arc;

    fn identity_bucket() -> Bucket<u32> {
        Bucket::new(BucketOptions::new(Arc::new(IdentityHasher), 256).unwrap())
    }

    #[rstest]
    #[case::zero(0)]
    #[case::one(1)]
    #[case::not_power_of_two(100)]
    #[case::too_large(2048)]
    fn invalid_fanout(#[case] fanout: u64) {
        assert_eq!(
            Some(InvalidFanout(fanout)),
            BucketOptions::new(Arc::new(Murmur3Hasher), fanout).err()
        );
    }

    #[test]
    fn put_get() {
        let mut bucket = identity_bucket();

        assert_eq!(Ok(None), bucket.put("a", 1));
        assert_eq!(Ok(None), bucket.put("b", 2));

        assert_eq!(Ok(Some(&1)), bucket.get("a"));
        assert_eq!(Ok(Some(&2)), bucket.get("b"));
        assert_eq!(Ok(None), bucket.get("c"));

        assert_eq!(2, bucket.leaf_count());
        assert_eq!(2, bucket.children_count());
    }

    #[test]
    fn replace_value() {
        let mut bucket = identity_bucket();

        bucket.put("a", 1).unwrap();
        assert_eq!(Ok(Some(1)), bucket.put("a", 3));
        assert_eq!(Ok(Some(&3)), bucket.get("a"));
        assert_eq!(1, bucket.leaf_count());
    }

    /// "aa" and "ab" share their first byte, so they get moved into a
    /// sub-bucket at slot 0x61 ('a'), where they land at 0x61 and 0x62.
    #[test]
    fn collision_allocates_sub_bucket() {
        let mut bucket = identity_bucket();

        bucket.put("aa", 1).unwrap();
        bucket.put("ab", 2).unwrap();
        bucket.put("b", 3).unwrap();

        assert_eq!(2, bucket.children_count());
        assert_eq!(3, bucket.leaf_count());
        assert_eq!(Ok(Some(&1)), bucket.get("aa"));
        assert_eq!(Ok(Some(&2)), bucket.get("ab"));
        // shares the slot with the sub-bucket, but isn't in there.
        assert_eq!(Ok(None), bucket.get("ac"));

        let slots: Vec<_> = bucket.compact_slots().collect();
        assert_eq!(2, slots.len());

        match slots[0] {
            (0x61, Slot::Bucket(child)) => {
                let child_slots: Vec<usize> = child.compact_slots().map(|(i, _)| i).collect();
                assert_eq!(vec![0x61, 0x62], child_slots);
                assert_eq!(2, child.leaf_count());
            }
            _ => panic!("expected sub-bucket at slot 0x61"),
        }
        match slots[1] {
            (0x62, Slot::Leaf(leaf)) => assert_eq!("b", leaf.key()),
            _ => panic!("expected leaf at slot 0x62"),
        }
    }

    #[test]
    fn leaves_in_slot_order() {
        let mut bucket = identity_bucket();

        for (i, key) in ["c", "ab", "b", "aa"].iter().enumerate() {
            bucket.put(*key, i as u32).unwrap();
        }

        let keys: Vec<&str> = bucket.leaves().map(|(k, _)| k).collect();
        assert_eq!(vec!["aa", "ab", "b", "c"], keys);
    }

    #[test]
    fn only_child() {
        let mut bucket = identity_bucket();
        assert_eq!(None, bucket.only_child());

        bucket.put("a", 1).unwrap();
        assert_eq!(Some(("a", &1)), bucket.only_child());

        bucket.put("b", 2).unwrap();
        assert_eq!(None, bucket.only_child());
    }

    #[test]
    fn only_child_sub_bucket() {
        let mut bucket = identity_bucket();
        bucket.put("aa", 1).unwrap();
        bucket.put("ab", 2).unwrap();

        // a single occupied slot, but it's a sub-bucket.
        assert_eq!(1, bucket.children_count());
        assert_eq!(None, bucket.only_child());
    }

    #[test]
    fn bitfield_matches_slots() {
        let mut bucket = identity_bucket();
        bucket.put("a", 1).unwrap();
        bucket.put("b", 2).unwrap();

        let bitfield = bucket.bitfield();
        assert_eq!(32, bitfield.len());
        assert_eq!(2, super::popcount(&bitfield));
        assert!(super::is_set(&bitfield, 0x61));
        assert!(super::is_set(&bitfield, 0x62));
        assert!(!super::is_set(&bitfield, 0x63));
    }

    #[test]
    fn many_keys_murmur3() {
        let mut bucket = Bucket::new(BucketOptions::new(Arc::new(Murmur3Hasher), 8).unwrap());

        for i in 0..500u32 {
            bucket.put(format!("file-{}", i), i).unwrap();
        }

        assert_eq!(500, bucket.leaf_count());
        assert!(bucket.children_count() <= 8);
        for i in 0..500u32 {
            assert_eq!(Ok(Some(&i)), bucket.get(&format!("file-{}", i)));
        }
    }

    #[test]
    fn broken_hash_function() {
        let mut bucket = Bucket::new(BucketOptions::new(Arc::new(ConstantHasher), 256).unwrap());

        bucket.put("a", 1).unwrap();
        assert!(matches!(bucket.put("b", 2), Err(HashError::Exhausted(_))));
    }
}
