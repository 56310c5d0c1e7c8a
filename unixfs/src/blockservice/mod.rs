use bytes::Bytes;

use crate::{B3Digest, Error};

mod from_addr;
mod memory;
mod redb;

#[cfg(test)]
mod tests;

pub use self::from_addr::from_addr;
pub use self::memory::MemoryBlockService;
pub use self::redb::RedbBlockService;

/// The base trait all BlockService services need to implement.
///
/// A block is an encoded [crate::nodes::DagNode], addressed by the blake3
/// digest of its bytes. Putting the same block multiple times is fine and
/// returns the same digest each time.
#[async_trait::async_trait]
pub trait BlockService: Send + Sync {
    /// Request a block from the store, by its digest.
    /// Returns Ok(None) if it doesn't exist.
    async fn get(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error>;

    /// Insert a block into the store, returning its digest.
    async fn put(&self, data: Bytes) -> Result<B3Digest, Error>;
}

#[async_trait::async_trait]
impl<A> BlockService for A
where
    A: AsRef<dyn BlockService> + Send + Sync,
{
    async fn get(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        self.as_ref().get(digest).await
    }

    async fn put(&self, data: Bytes) -> Result<B3Digest, Error> {
        self.as_ref().put(data).await
    }
}
