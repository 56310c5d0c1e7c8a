//! Reconstructs paths and file contents from the address of a root node.
//!
//! [export] walks the DAG depth-first, in link order, producing an
//! [ExportEntry] for every directory and file it encounters. Nodes are only
//! fetched from the [BlockService] as the stream gets polled, with sibling
//! nodes fetched concurrently.
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::instrument;

use crate::blockservice::BlockService;
use crate::nodes::DagNode;
use crate::B3Digest;

mod error;
mod file;
pub mod fs;
mod resolve;

pub use error::ExportError;

/// Number of sibling nodes fetched concurrently while walking a directory.
pub const DIRECTORY_CONCURRENCY: usize = 32;

/// Number of blocks of a file fetched ahead of the one being read.
pub const FILE_CONCURRENCY: usize = 8;

pub enum ExportEntry {
    /// A directory. All entries below it follow, before any entry outside
    /// of it.
    Directory { path: String, digest: B3Digest },

    File {
        path: String,
        digest: B3Digest,
        /// The length of the contents.
        size: u64,
        /// The contents, fetched as they get read.
        content: BoxStream<'static, Result<Bytes, ExportError>>,
    },
}

impl ExportEntry {
    pub fn path(&self) -> &str {
        match self {
            ExportEntry::Directory { path, .. } => path,
            ExportEntry::File { path, .. } => path,
        }
    }

    pub fn digest(&self) -> &B3Digest {
        match self {
            ExportEntry::Directory { digest, .. } => digest,
            ExportEntry::File { digest, .. } => digest,
        }
    }
}

impl std::fmt::Debug for ExportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportEntry::Directory { path, digest } => f
                .debug_struct("Directory")
                .field("path", path)
                .field("digest", digest)
                .finish(),
            ExportEntry::File {
                path, digest, size, ..
            } => f
                .debug_struct("File")
                .field("path", path)
                .field("digest", digest)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

/// Exports the DAG below `root`.
///
/// The path of the root entry is the string representation of `root`, all
/// other paths are below it.
/// The stream ends after the first error.
pub fn export<BS>(
    block_service: BS,
    root: B3Digest,
) -> BoxStream<'static, Result<ExportEntry, ExportError>>
where
    BS: BlockService + Clone + 'static,
{
    async_stream::stream! {
        let node = match fetch_node(&block_service, &root).await {
            Ok(node) => node,
            Err(e) => {
                yield Err(e);
                return;
            }
        };

        let entries = resolve::resolve(
            block_service,
            node,
            root.clone(),
            root.to_string(),
            resolve::Expect::Entry,
        );

        for await entry in stop_after_error(entries) {
            yield entry;
        }
    }
    .boxed()
}

/// Fetches and decodes a node.
#[instrument(level = "trace", skip_all, fields(node.digest = %digest), err)]
pub(crate) async fn fetch_node<BS>(
    block_service: &BS,
    digest: &B3Digest,
) -> Result<DagNode, ExportError>
where
    BS: BlockService,
{
    let data = block_service
        .get(digest)
        .await
        .map_err(|e| ExportError::Store(digest.clone(), e))?
        .ok_or_else(|| ExportError::NotFound(digest.clone()))?;

    DagNode::decode(&data).map_err(|e| ExportError::from_decode(digest, e))
}

/// Ends the stream after its first error.
pub(crate) fn stop_after_error<T>(
    mut stream: BoxStream<'static, Result<T, ExportError>>,
) -> BoxStream<'static, Result<T, ExportError>>
where
    T: Send + 'static,
{
    async_stream::stream! {
        while let Some(item) = stream.next().await {
            let failed = item.is_err();
            yield item;
            if failed {
                break;
            }
        }
    }
    .boxed()
}
