//! The in-memory tree an import builds, before it is flushed into nodes.
use tracing::debug;

use crate::hamt::BucketOptions;
use crate::nodes::EncodedNode;
use crate::B3Digest;

use super::dir::{Dir, FlatDir, ShardedDir};
use super::{ImportError, ImportRecord};

/// Index of a node in the arena of a [TreeBuilder].
pub(crate) type NodeId = usize;

const ROOT: NodeId = 0;

/// The address and DAG size of a finalized node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub digest: B3Digest,
    pub size: u64,
}

pub(crate) enum TreeNode {
    /// A file, which is finalized before it is inserted.
    Leaf(Sealed),
    FlatDir(FlatDir, DirMeta),
    ShardedDir(ShardedDir, DirMeta),
}

pub(crate) struct DirMeta {
    name: String,
    parent: Option<NodeId>,
    dirty: bool,
    /// Only valid if not dirty.
    cached: Option<Sealed>,
}

impl DirMeta {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_owned(),
            parent,
            dirty: true,
            cached: None,
        }
    }
}

impl TreeNode {
    fn dir(&self) -> Option<(&dyn Dir, &DirMeta)> {
        match self {
            TreeNode::Leaf(_) => None,
            TreeNode::FlatDir(dir, meta) => Some((dir as &dyn Dir, meta)),
            TreeNode::ShardedDir(dir, meta) => Some((dir as &dyn Dir, meta)),
        }
    }

    fn dir_mut(&mut self) -> Option<(&mut dyn Dir, &mut DirMeta)> {
        match self {
            TreeNode::Leaf(_) => None,
            TreeNode::FlatDir(dir, meta) => Some((dir as &mut dyn Dir, meta)),
            TreeNode::ShardedDir(dir, meta) => Some((dir as &mut dyn Dir, meta)),
        }
    }
}

/// Builds the tree of an import.
///
/// Nodes live in an arena and refer to each other by [NodeId]. Insertions
/// only mark the directories on their way dirty, encoding happens in
/// [TreeBuilder::seal], driven by the order [TreeBuilder::flush_order]
/// returns.
pub(crate) struct TreeBuilder {
    nodes: Vec<TreeNode>,
    bucket_options: BucketOptions,
    shard_split_threshold: usize,
    wrap: bool,
}

impl TreeBuilder {
    pub(crate) fn new(
        bucket_options: BucketOptions,
        shard_split_threshold: usize,
        wrap: bool,
    ) -> Self {
        Self {
            nodes: vec![TreeNode::FlatDir(FlatDir::default(), DirMeta::new("", None))],
            bucket_options,
            shard_split_threshold,
            wrap,
        }
    }

    /// Inserts a finalized file at `path`, replacing a file already there.
    pub(crate) fn insert_file(&mut self, path: &str, file: Sealed) -> Result<(), ImportError> {
        let (parent, name) = self.walk(path)?;
        let name = name.ok_or_else(|| ImportError::invalid_input(path, "empty path"))?;

        match self.dir(parent).get(name)? {
            Some(id) if matches!(self.nodes[id], TreeNode::Leaf(_)) => {
                // The parent keeps pointing to the same id.
                self.nodes[id] = TreeNode::Leaf(file);
            }
            Some(_) => return Err(ImportError::invalid_input(path, "is a directory")),
            None => {
                let id = self.alloc(TreeNode::Leaf(file));
                self.put(parent, name, id)?;
            }
        }

        Ok(())
    }

    /// Ensures a directory exists at `path`.
    pub(crate) fn insert_dir(&mut self, path: &str) -> Result<(), ImportError> {
        let (parent, name) = self.walk(path)?;
        if let Some(name) = name {
            self.dir_child(parent, name, path)?;
        }

        Ok(())
    }

    /// Walks to the parent directory of the last segment of `path`, creating
    /// missing directories and marking all of them dirty on the way.
    fn walk<'p>(&mut self, path: &'p str) -> Result<(NodeId, Option<&'p str>), ImportError> {
        let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut current = ROOT;

        self.mark_dirty(current);
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return Ok((current, Some(segment)));
            }

            current = self.dir_child(current, segment, path)?;
            self.mark_dirty(current);
        }

        Ok((current, None))
    }

    /// Returns the child directory `name` of `parent`, creating it if missing.
    fn dir_child(&mut self, parent: NodeId, name: &str, path: &str) -> Result<NodeId, ImportError> {
        match self.dir(parent).get(name)? {
            Some(id) if self.nodes[id].dir().is_some() => Ok(id),
            Some(_) => Err(ImportError::invalid_input(path, format!("{} is a file", name))),
            None => {
                let id = self.alloc(TreeNode::FlatDir(
                    FlatDir::default(),
                    DirMeta::new(name, Some(parent)),
                ));
                self.put(parent, name, id)?;
                Ok(id)
            }
        }
    }

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn dir(&self, id: NodeId) -> &dyn Dir {
        self.nodes[id]
            .dir()
            .map(|(dir, _)| dir)
            .expect("Tvix bug: node is not a directory")
    }

    fn meta(&self, id: NodeId) -> &DirMeta {
        self.nodes[id]
            .dir()
            .map(|(_, meta)| meta)
            .expect("Tvix bug: node is not a directory")
    }

    fn mark_dirty(&mut self, id: NodeId) {
        if let Some((_, meta)) = self.nodes[id].dir_mut() {
            meta.dirty = true;
            meta.cached = None;
        }
    }

    /// Puts a child into a directory, promoting it to a sharded directory
    /// if it got too large.
    fn put(&mut self, parent: NodeId, name: &str, child: NodeId) -> Result<(), ImportError> {
        let (dir, _) = self.nodes[parent]
            .dir_mut()
            .expect("Tvix bug: parent is not a directory");
        dir.put(name, child)?;

        if let TreeNode::FlatDir(flat, _) = &self.nodes[parent] {
            if flat.direct_children_count() >= self.shard_split_threshold {
                self.promote(parent)?;
            }
        }

        Ok(())
    }

    /// Replaces a flat directory by a sharded one with the same children.
    /// The id stays the same, so the parent doesn't need to be updated.
    fn promote(&mut self, id: NodeId) -> Result<(), ImportError> {
        debug!(path = %self.path_of(id), "promoting directory to HAMT shard");

        if let TreeNode::FlatDir(flat, meta) = &mut self.nodes[id] {
            let sharded = flat.shard(self.bucket_options.clone())?;
            let meta = std::mem::replace(meta, DirMeta::new("", None));
            self.nodes[id] = TreeNode::ShardedDir(sharded, meta);
        }

        Ok(())
    }

    /// The path of a node, which is the empty string for the root.
    pub(crate) fn path_of(&self, mut id: NodeId) -> String {
        let mut names = Vec::new();
        while let Some(parent) = self.meta(id).parent {
            names.push(self.meta(id).name.as_str());
            id = parent;
        }
        names.reverse();
        names.join("/")
    }

    /// Returns the directories to seal, children before parents.
    ///
    /// Directories which are not dirty are skipped. The root is only included
    /// if it should be wrapped.
    pub(crate) fn flush_order(&self) -> Result<Vec<NodeId>, ImportError> {
        if !self.wrap && self.dir(ROOT).child_count() > 1 {
            return Err(ImportError::AmbiguousRoot);
        }

        let mut order = Vec::new();
        // (node, whether its children were already pushed)
        let mut stack = vec![(ROOT, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if id != ROOT || self.wrap {
                    order.push(id);
                }
                continue;
            }

            let Some((dir, meta)) = self.nodes[id].dir() else {
                continue;
            };
            // Everything below a clean directory is clean as well.
            if !meta.dirty {
                continue;
            }

            stack.push((id, true));
            // reversed, so the first child gets popped first.
            let children: Vec<NodeId> = dir.children().map(|(_, child)| child).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, false)));
        }

        Ok(order)
    }

    /// Encodes a directory whose children are all finalized.
    ///
    /// Returns the record for it, and all nodes that need to be stored, with
    /// the node of the directory itself last.
    pub(crate) fn seal(
        &mut self,
        id: NodeId,
    ) -> Result<(ImportRecord, Vec<EncodedNode>), ImportError> {
        let nodes = self.dir(id).encode(&|child| self.sealed(child))?;
        let top = nodes.last().expect("Tvix bug: directory encoded to no nodes");

        let sealed = Sealed {
            digest: top.digest.clone(),
            size: top.size,
        };

        if let Some((_, meta)) = self.nodes[id].dir_mut() {
            meta.dirty = false;
            meta.cached = Some(sealed.clone());
        }

        debug!(
            path = %self.path_of(id),
            digest = %sealed.digest,
            nodes = nodes.len(),
            "sealed directory"
        );

        Ok((
            ImportRecord {
                path: self.path_of(id),
                digest: sealed.digest,
                size: sealed.size,
            },
            nodes,
        ))
    }

    fn sealed(&self, id: NodeId) -> Sealed {
        match &self.nodes[id] {
            TreeNode::Leaf(sealed) => sealed.clone(),
            TreeNode::FlatDir(_, meta) | TreeNode::ShardedDir(_, meta) => meta
                .cached
                .clone()
                .filter(|_| !meta.dirty)
                .expect("Tvix bug: child sealed after parent"),
        }
    }

    /// The result of the last flush: the wrapping root directory, or its
    /// only child. None if there's nothing.
    pub(crate) fn root(&self) -> Option<Sealed> {
        if self.wrap {
            return self.meta(ROOT).cached.clone();
        }

        self.dir(ROOT)
            .only_child()
            .map(|(_, child)| self.sealed(child))
    }

    #[cfg(test)]
    fn is_sharded(&self, path: &str) -> bool {
        let mut id = ROOT;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            id = self.dir(id).get(segment).unwrap().unwrap();
        }
        matches!(self.nodes[id], TreeNode::ShardedDir(..))
    }
}
