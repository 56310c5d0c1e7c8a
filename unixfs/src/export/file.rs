use bytes::Bytes;
use futures::future::ready;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::blockservice::BlockService;
use crate::nodes::{DagNode, NodeKind};
use crate::B3Digest;

use super::{fetch_node, stop_after_error, ExportError, FILE_CONCURRENCY};

/// Streams the contents of the file below `node`.
///
/// Every node below has to be a file node with exactly the length announced
/// by its parent.
pub(super) fn content<BS>(
    block_service: BS,
    node: DagNode,
    digest: B3Digest,
) -> BoxStream<'static, Result<Bytes, ExportError>>
where
    BS: BlockService + Clone + 'static,
{
    stop_after_error(blocks(block_service, node, digest))
}

fn blocks<BS>(
    block_service: BS,
    node: DagNode,
    digest: B3Digest,
) -> BoxStream<'static, Result<Bytes, ExportError>>
where
    BS: BlockService + Clone + 'static,
{
    let (kind, links) = node.into_parts();
    let (data, block_sizes) = match kind {
        NodeKind::File { data, block_sizes } => (data, block_sizes),
        _ => {
            return stream::once(ready(Err(ExportError::invalid(
                &digest,
                "file links to a node which is no file",
            ))))
            .boxed()
        }
    };

    let inline = stream::iter(data.filter(|d| !d.is_empty()).map(Ok));

    let below = stream::iter(links.into_iter().zip(block_sizes))
        .map({
            let block_service = block_service.clone();
            move |(link, expected_size)| {
                let block_service = block_service.clone();
                async move {
                    let child = fetch_node(&block_service, &link.digest).await?;

                    match child.kind().file_size() {
                        Some(size) if size == expected_size => Ok((child, link.digest)),
                        Some(size) => Err(ExportError::invalid(
                            &link.digest,
                            format!("expected {} bytes of content, got {}", expected_size, size),
                        )),
                        None => Err(ExportError::invalid(
                            &link.digest,
                            "file links to a node which is no file",
                        )),
                    }
                }
            }
        })
        .buffered(FILE_CONCURRENCY)
        .map(move |fetched| match fetched {
            Ok((child, digest)) => blocks(block_service.clone(), child, digest),
            Err(e) => stream::once(ready(Err(e))).boxed(),
        })
        .flatten();

    inline.chain(below).boxed()
}
