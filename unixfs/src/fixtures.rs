use crate::{
    hamt::{HashError, HashFunction},
    nodes::{DagNode, Link, NodeKind},
    B3Digest,
};
use bytes::Bytes;
use lazy_static::lazy_static;

pub const HELLOWORLD_CONTENTS: &[u8] = b"Hello World!";
pub const BEST_BYTES_CONTENTS: &[u8] = b"i have the best bytes";

lazy_static! {
    pub static ref DUMMY_DIGEST: B3Digest = {
        let u: &[u8; 32] = &[0x00; 32];
        u.into()
    };
    pub static ref DUMMY_DIGEST_2: B3Digest = {
        let mut u = [0x00; 32];
        u[0] = 0x10;
        (&u).into()
    };

    // A file small enough to be stored inline.
    pub static ref HELLOWORLD_FILE_NODE: DagNode = DagNode::new(
        NodeKind::inline_file(Bytes::from_static(HELLOWORLD_CONTENTS)),
        vec![],
    )
    .unwrap();
    pub static ref HELLOWORLD_FILE_DIGEST: B3Digest = HELLOWORLD_FILE_NODE.seal().digest;

    // A flat directory containing HELLOWORLD_FILE_NODE as "hello.txt".
    pub static ref DIRECTORY_WITH_HELLOWORLD: DagNode = DagNode::new(
        NodeKind::FlatDirectory,
        vec![Link::named(
            "hello.txt",
            HELLOWORLD_FILE_DIGEST.clone(),
            HELLOWORLD_FILE_NODE.seal().size,
        )],
    )
    .unwrap();

    // Just below 1MiB, spanning 4 blocks with the default chunk size.
    pub static ref BLOB_B: Bytes = (0..255).collect::<Vec<u8>>().repeat(4 * 1024 + 16).into();
}

/// Returns the input as digest.
pub struct IdentityHasher;

impl HashFunction for IdentityHasher {
    fn hash_type(&self) -> u64 {
        0x00
    }

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        Ok(data.to_vec())
    }
}

/// Returns the last byte of the input as digest.
pub struct LastByteHasher;

impl HashFunction for LastByteHasher {
    fn hash_type(&self) -> u64 {
        0x01
    }

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        data.last()
            .map(|b| vec![*b])
            .ok_or(HashError::EmptyDigest)
    }
}

/// Maps every input to the same digest, making all names collide.
pub struct ConstantHasher;

impl HashFunction for ConstantHasher {
    fn hash_type(&self) -> u64 {
        0x02
    }

    fn hash(&self, _data: &[u8]) -> Result<Vec<u8>, HashError> {
        Ok(vec![0x00; 8])
    }
}

/// Fails on every input.
pub struct FailingHasher;

impl HashFunction for FailingHasher {
    fn hash_type(&self) -> u64 {
        0x03
    }

    fn hash(&self, _data: &[u8]) -> Result<Vec<u8>, HashError> {
        Err(HashError::Failed("nope".into()))
    }
}
