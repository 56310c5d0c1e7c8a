use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};

use crate::{blockservice::BlockService, nodes::EncodedNode, Error};

use super::ImportError;

/// The maximum amount of bytes allowed to be buffered in memory, per import,
/// while waiting for blocks to be uploaded.
pub(crate) const MAX_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Uploads blocks to a [BlockService] in the background.
///
/// The digest of a node is known before it is stored, so the nodes above it
/// can be built without waiting for the upload. The amount of data in flight
/// is bounded by the semaphore, which is shared by all uploaders of an import.
///
/// Once all blocks have been passed in, make sure to call
/// [ConcurrentBlockUploader::join] to wait for all background jobs to complete
/// and check for any errors.
pub(crate) struct ConcurrentBlockUploader<BS> {
    block_service: BS,
    upload_tasks: JoinSet<Result<(), ImportError>>,
    upload_semaphore: Arc<Semaphore>,
}

impl<BS> ConcurrentBlockUploader<BS>
where
    BS: BlockService + Clone + 'static,
{
    pub(crate) fn new(block_service: BS, upload_semaphore: Arc<Semaphore>) -> Self {
        Self {
            block_service,
            upload_tasks: JoinSet::new(),
            upload_semaphore,
        }
    }

    /// Queues the node for upload, waiting if too much data is in flight.
    /// `path` is only used for errors.
    pub(crate) async fn upload(&mut self, path: &str, node: EncodedNode) {
        // Oversized blocks take up the whole buffer.
        let weight = node.data.len().clamp(1, MAX_BUFFER_SIZE) as u32;

        let permit = self
            .upload_semaphore
            .clone()
            .acquire_many_owned(weight)
            .await
            .expect("Tvix bug: upload semaphore closed");

        self.upload_tasks.spawn({
            let block_service = self.block_service.clone();
            let path = path.to_owned();
            async move {
                let digest = block_service
                    .put(node.data)
                    .await
                    .map_err(|e| ImportError::Store(path.clone(), e))?;

                if digest != node.digest {
                    return Err(ImportError::Store(
                        path,
                        Error::DigestMismatch {
                            expected: node.digest,
                            actual: digest,
                        },
                    ));
                }

                // Make sure we hold the permit until we finish writing the
                // block to the [BlockService].
                drop(permit);
                Ok(())
            }
        });
    }

    /// Waits for all background upload jobs to complete, returning the first
    /// upload error.
    pub(crate) async fn join(mut self) -> Result<(), ImportError> {
        while let Some(result) = self.upload_tasks.join_next().await {
            result??;
        }
        Ok(())
    }
}
