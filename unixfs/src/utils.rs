//! Constructors to provide instances of a BlockService.
//! Only used for testing purposes, but across crates.
use std::sync::Arc;

use crate::blockservice::{BlockService, MemoryBlockService};

pub fn gen_block_service() -> Arc<dyn BlockService> {
    Arc::new(MemoryBlockService::default())
}
