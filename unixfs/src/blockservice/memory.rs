use bytes::Bytes;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::instrument;

use super::BlockService;
use crate::{B3Digest, Error};

#[derive(Clone, Default)]
pub struct MemoryBlockService {
    db: Arc<RwLock<HashMap<B3Digest, Bytes>>>,
}

impl MemoryBlockService {
    /// Number of blocks stored.
    pub fn len(&self) -> usize {
        self.db.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.read().is_empty()
    }
}

#[async_trait::async_trait]
impl BlockService for MemoryBlockService {
    #[instrument(skip(self, digest), fields(block.digest=%digest))]
    async fn get(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        Ok(self.db.read().get(digest).cloned())
    }

    #[instrument(skip_all, fields(block.size=data.len()))]
    async fn put(&self, data: Bytes) -> Result<B3Digest, Error> {
        let digest = B3Digest::of(&data);

        // Only insert if the block doesn't already exist.
        if !self.db.read().contains_key(&digest) {
            self.db.write().insert(digest.clone(), data);
        }

        Ok(digest)
    }
}
