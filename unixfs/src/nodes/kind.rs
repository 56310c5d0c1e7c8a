use bytes::Bytes;

/// What a [super::DagNode] represents, carried in its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A file, or a part of one.
    /// `data` holds content stored inline in this node, `block_sizes` the
    /// logical length of the content below each link, in link order.
    File {
        data: Option<Bytes>,
        block_sizes: Vec<u64>,
    },

    /// A directory with all children as named links.
    FlatDirectory,

    /// One bucket of a HAMT-sharded directory.
    /// Links follow the set bits of `bitfield` in ascending slot order.
    HamtShardedDirectory {
        fanout: u64,
        hash_type: u64,
        bitfield: Bytes,
    },
}

impl NodeKind {
    /// A file node holding `data` inline, without any links.
    pub fn inline_file(data: Bytes) -> Self {
        NodeKind::File {
            data: Some(data),
            block_sizes: vec![],
        }
    }

    /// The logical size of the file below this node, or None for
    /// directories.
    pub fn file_size(&self) -> Option<u64> {
        match self {
            NodeKind::File { data, block_sizes } => Some(
                data.as_ref().map(|d| d.len() as u64).unwrap_or_default()
                    + block_sizes.iter().sum::<u64>(),
            ),
            _ => None,
        }
    }
}
