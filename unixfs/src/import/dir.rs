//! The two representations a directory can have while it is being built.
//!
//! A directory starts out as a [FlatDir] and is turned into a [ShardedDir]
//! once it gets too large. Both store [NodeId]s pointing into the arena of the
//! [super::tree::TreeBuilder], not the children themselves.
use std::collections::BTreeMap;

use crate::hamt::{Bucket, BucketOptions, HashError, Slot};
use crate::nodes::{DagNode, DecodeError, EncodedNode, Link, NodeKind};

use super::tree::{NodeId, Sealed};

/// The operations both directory representations support.
pub(crate) trait Dir {
    /// Adds or replaces a child, returning the previous one.
    fn put(&mut self, name: &str, child: NodeId) -> Result<Option<NodeId>, HashError>;

    fn get(&self, name: &str) -> Result<Option<NodeId>, HashError>;

    /// Number of children.
    fn child_count(&self) -> usize;

    /// Number of entries in the top level table, which for a sharded
    /// directory counts a sub-bucket as one.
    fn direct_children_count(&self) -> usize;

    fn only_child(&self) -> Option<(&str, NodeId)>;

    /// All children, in the order their links are written.
    fn children(&self) -> Box<dyn Iterator<Item = (&str, NodeId)> + '_>;

    /// Encodes the directory, looking up the already finalized children
    /// through `resolve`.
    ///
    /// Returns all nodes making up the directory. The node of the directory
    /// itself comes last, the nodes it links to come before it.
    fn encode(&self, resolve: &dyn Fn(NodeId) -> Sealed)
        -> Result<Vec<EncodedNode>, DecodeError>;
}

#[derive(Default)]
pub(crate) struct FlatDir {
    children: BTreeMap<String, NodeId>,
}

impl FlatDir {
    /// Moves all children into a new [ShardedDir], leaving this one empty.
    pub(crate) fn shard(&mut self, options: BucketOptions) -> Result<ShardedDir, HashError> {
        let mut sharded = ShardedDir {
            bucket: Bucket::new(options),
        };

        for (name, child) in std::mem::take(&mut self.children) {
            sharded.bucket.put(name, child)?;
        }

        Ok(sharded)
    }
}

impl Dir for FlatDir {
    fn put(&mut self, name: &str, child: NodeId) -> Result<Option<NodeId>, HashError> {
        Ok(self.children.insert(name.to_owned(), child))
    }

    fn get(&self, name: &str) -> Result<Option<NodeId>, HashError> {
        Ok(self.children.get(name).copied())
    }

    fn child_count(&self) -> usize {
        self.children.len()
    }

    fn direct_children_count(&self) -> usize {
        self.children.len()
    }

    fn only_child(&self) -> Option<(&str, NodeId)> {
        if self.children.len() != 1 {
            return None;
        }
        self.children
            .iter()
            .next()
            .map(|(name, id)| (name.as_str(), *id))
    }

    fn children(&self) -> Box<dyn Iterator<Item = (&str, NodeId)> + '_> {
        Box::new(self.children.iter().map(|(name, id)| (name.as_str(), *id)))
    }

    fn encode(
        &self,
        resolve: &dyn Fn(NodeId) -> Sealed,
    ) -> Result<Vec<EncodedNode>, DecodeError> {
        let links = self
            .children
            .iter()
            .map(|(name, id)| {
                let child = resolve(*id);
                Link::named(name.as_str(), child.digest, child.size)
            })
            .collect();

        Ok(vec![DagNode::new(NodeKind::FlatDirectory, links)?.seal()])
    }
}

pub(crate) struct ShardedDir {
    bucket: Bucket<NodeId>,
}

impl Dir for ShardedDir {
    fn put(&mut self, name: &str, child: NodeId) -> Result<Option<NodeId>, HashError> {
        self.bucket.put(name, child)
    }

    fn get(&self, name: &str) -> Result<Option<NodeId>, HashError> {
        Ok(self.bucket.get(name)?.copied())
    }

    fn child_count(&self) -> usize {
        self.bucket.leaf_count()
    }

    fn direct_children_count(&self) -> usize {
        self.bucket.children_count()
    }

    fn only_child(&self) -> Option<(&str, NodeId)> {
        self.bucket.only_child().map(|(name, id)| (name, *id))
    }

    fn children(&self) -> Box<dyn Iterator<Item = (&str, NodeId)> + '_> {
        Box::new(self.bucket.leaves().map(|(name, id)| (name, *id)))
    }

    fn encode(
        &self,
        resolve: &dyn Fn(NodeId) -> Sealed,
    ) -> Result<Vec<EncodedNode>, DecodeError> {
        let mut out = Vec::new();
        let top = encode_bucket(&self.bucket, resolve, &mut out)?;
        out.push(top);

        Ok(out)
    }
}

/// Encodes a bucket, pushing the nodes of all sub-buckets to `out` and
/// returning the node of the bucket itself.
fn encode_bucket(
    bucket: &Bucket<NodeId>,
    resolve: &dyn Fn(NodeId) -> Sealed,
    out: &mut Vec<EncodedNode>,
) -> Result<EncodedNode, DecodeError> {
    let mut links = Vec::with_capacity(bucket.children_count());

    for (_, slot) in bucket.compact_slots() {
        match slot {
            Slot::Leaf(leaf) => {
                let child = resolve(*leaf.value());
                links.push(Link::named(leaf.key(), child.digest, child.size));
            }
            Slot::Bucket(sub_bucket) => {
                let sub = encode_bucket(sub_bucket, resolve, out)?;
                links.push(Link::anonymous(sub.digest.clone(), sub.size));
                out.push(sub);
            }
        }
    }

    let options = bucket.options();
    let node = DagNode::new(
        NodeKind::HamtShardedDirectory {
            fanout: options.fanout(),
            hash_type: options.hash_type(),
            bitfield: bucket.bitfield(),
        },
        links,
    )?;

    Ok(node.seal())
}
