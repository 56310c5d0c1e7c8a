use crate::B3Digest;

/// A reference from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The name of the child. Absent for links to HAMT sub-buckets and file
    /// blocks.
    pub name: Option<String>,

    /// The cumulative size of the child node and everything below it.
    pub size: u64,

    /// The digest of the encoded child node.
    pub digest: B3Digest,
}

impl Link {
    pub fn named(name: impl Into<String>, digest: B3Digest, size: u64) -> Self {
        Self {
            name: Some(name.into()),
            size,
            digest,
        }
    }

    pub fn anonymous(digest: B3Digest, size: u64) -> Self {
        Self {
            name: None,
            size,
            digest,
        }
    }
}

/// Checks a name for validity as a directory entry.
/// We disallow slashes, null bytes, '.', '..' and the empty string.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != ".." && name != "." && !name.contains(['\0', '/'])
}
