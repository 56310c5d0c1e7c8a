//! Turning the contents of a file into a (balanced) tree of file nodes.
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tracing::{instrument, trace};

use crate::blockservice::BlockService;
use crate::chunker::Chunker;
use crate::nodes::{DagNode, Link, NodeKind};

use super::tree::Sealed;
use super::upload::ConcurrentBlockUploader;
use super::ImportError;

/// A node one level up has to link to.
struct Block {
    sealed: Sealed,
    /// Logical length of the content below.
    len: u64,
}

/// Chunks and stores the contents of a file, returning its root node.
///
/// Contents fitting into a single chunk end up inline in one node.
/// Otherwise, each chunk is stored in a leaf node, and the leaves get linked
/// from parent nodes with at most `max_links` links each, until a single
/// node remains.
#[instrument(skip(block_service, chunker, reader, upload_semaphore), err)]
pub(crate) async fn import_file<BS>(
    block_service: BS,
    chunker: &dyn Chunker,
    reader: Box<dyn AsyncRead + Send + Unpin + '_>,
    max_links: usize,
    upload_semaphore: Arc<Semaphore>,
    path: &str,
) -> Result<Sealed, ImportError>
where
    BS: BlockService + Clone + 'static,
{
    let mut chunks = chunker.chunks(reader);
    let read_err = |e| ImportError::ContentRead(path.to_owned(), e);

    let first = chunks.try_next().await.map_err(read_err)?;
    let second = chunks.try_next().await.map_err(read_err)?;

    let mut uploader = ConcurrentBlockUploader::new(block_service, upload_semaphore);

    let second = match second {
        Some(second) => second,
        None => {
            // Everything fits into a single node.
            let node =
                DagNode::new(NodeKind::inline_file(first.unwrap_or_default()), vec![])?.seal();
            let sealed = Sealed {
                digest: node.digest.clone(),
                size: node.size,
            };

            uploader.upload(path, node).await;
            uploader.join().await?;

            return Ok(sealed);
        }
    };

    let mut level = Vec::new();
    let mut pending = futures::stream::iter(
        [first, Some(second)]
            .into_iter()
            .flatten()
            .map(Ok::<_, std::io::Error>),
    )
    .chain(chunks);

    while let Some(chunk) = pending.try_next().await.map_err(read_err)? {
        level.push(store_leaf(&mut uploader, path, chunk).await?);
    }

    while level.len() > 1 {
        trace!(blocks = level.len(), "building file layer");

        let mut parents = Vec::with_capacity(level.len().div_ceil(max_links));
        for group in level.chunks(max_links) {
            parents.push(store_parent(&mut uploader, path, group).await?);
        }
        level = parents;
    }

    uploader.join().await?;

    let root = level.pop().expect("Tvix bug: file without blocks");
    Ok(root.sealed)
}

async fn store_leaf<BS>(
    uploader: &mut ConcurrentBlockUploader<BS>,
    path: &str,
    chunk: Bytes,
) -> Result<Block, ImportError>
where
    BS: BlockService + Clone + 'static,
{
    let len = chunk.len() as u64;
    let node = DagNode::new(NodeKind::inline_file(chunk), vec![])?.seal();

    let block = Block {
        sealed: Sealed {
            digest: node.digest.clone(),
            size: node.size,
        },
        len,
    };
    uploader.upload(path, node).await;

    Ok(block)
}

async fn store_parent<BS>(
    uploader: &mut ConcurrentBlockUploader<BS>,
    path: &str,
    children: &[Block],
) -> Result<Block, ImportError>
where
    BS: BlockService + Clone + 'static,
{
    let node = DagNode::new(
        NodeKind::File {
            data: None,
            block_sizes: children.iter().map(|b| b.len).collect(),
        },
        children
            .iter()
            .map(|b| Link::anonymous(b.sealed.digest.clone(), b.sealed.size))
            .collect(),
    )?;

    let encoded = node.seal();
    let block = Block {
        sealed: Sealed {
            digest: encoded.digest.clone(),
            size: encoded.size,
        },
        len: node.kind().file_size().unwrap_or_default(),
    };
    uploader.upload(path, encoded).await;

    Ok(block)
}
