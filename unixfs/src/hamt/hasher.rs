use std::io::Cursor;
use std::sync::Arc;

use super::HashError;

/// The hash function used to place names into the slots of a [super::Bucket].
///
/// Implementations must be deterministic, the same input always has to produce
/// the same output, as slot positions are re-derived from names when reading.
pub trait HashFunction: Send + Sync {
    /// Stable identifier of this function, persisted as `hashType` in every
    /// shard node.
    fn hash_type(&self) -> u64;

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError>;
}

impl<H> HashFunction for Arc<H>
where
    H: HashFunction + ?Sized,
{
    fn hash_type(&self) -> u64 {
        self.as_ref().hash_type()
    }

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        self.as_ref().hash(data)
    }
}

/// murmur3 x64 128, truncated to the first 64 bits (big endian).
#[derive(Clone, Copy, Debug, Default)]
pub struct Murmur3Hasher;

impl Murmur3Hasher {
    pub const HASH_TYPE: u64 = 0x22;
}

impl HashFunction for Murmur3Hasher {
    fn hash_type(&self) -> u64 {
        Self::HASH_TYPE
    }

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        let h = murmur3::murmur3_x64_128(&mut Cursor::new(data), 0)
            .map_err(|e| HashError::Failed(e.to_string()))?;

        // the lower half holds h1.
        Ok((h as u64).to_be_bytes().to_vec())
    }
}

/// blake3, producing the full 32 byte digest.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    pub const HASH_TYPE: u64 = 0x1e;
}

impl HashFunction for Blake3Hasher {
    fn hash_type(&self) -> u64 {
        Self::HASH_TYPE
    }

    fn hash(&self, data: &[u8]) -> Result<Vec<u8>, HashError> {
        Ok(blake3::hash(data).as_bytes().to_vec())
    }
}

/// A hash of a key which can be read to arbitrary length.
///
/// The first digest is the hash of the key itself. Once its bits are used up,
/// the key with a round counter byte appended is hashed again, and the result
/// is appended, and so on.
pub(crate) struct InfiniteHash {
    key: Vec<u8>,
    hash_fn: Arc<dyn HashFunction>,
    buf: Vec<u8>,
    digest_len: usize,
    round: u8,
}

impl InfiniteHash {
    pub(crate) fn new(key: &[u8], hash_fn: Arc<dyn HashFunction>) -> Result<Self, HashError> {
        let buf = hash_fn.hash(key)?;
        if buf.is_empty() {
            return Err(HashError::EmptyDigest);
        }

        Ok(Self {
            key: key.to_vec(),
            hash_fn,
            digest_len: buf.len(),
            buf,
            round: 0,
        })
    }

    /// Returns `bits` bits starting at bit offset `depth * bits`, read most
    /// significant bit first.
    pub(crate) fn index_at(&mut self, depth: usize, bits: u32) -> Result<usize, HashError> {
        let start = depth * bits as usize;
        let end = start + bits as usize;

        while self.buf.len() * 8 < end {
            self.extend()?;
        }

        let mut index = 0usize;
        for bit in start..end {
            let byte = self.buf[bit / 8];
            let set = (byte >> (7 - (bit % 8))) & 1;
            index = (index << 1) | set as usize;
        }

        Ok(index)
    }

    fn extend(&mut self) -> Result<(), HashError> {
        self.round = self
            .round
            .checked_add(1)
            .ok_or_else(|| HashError::Exhausted(String::from_utf8_lossy(&self.key).into()))?;

        let mut input = self.key.clone();
        input.push(self.round);

        let digest = self.hash_fn.hash(&input)?;
        if digest.len() != self.digest_len {
            return Err(HashError::InconsistentLength(self.digest_len, digest.len()));
        }

        self.buf.extend_from_slice(&digest);
        Ok(())
    }
}
