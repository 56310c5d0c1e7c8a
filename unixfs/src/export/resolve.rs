use futures::future::ready;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

use crate::blockservice::BlockService;
use crate::nodes::{DagNode, Link, NodeKind};
use crate::B3Digest;

use super::{fetch_node, file, ExportEntry, ExportError, DIRECTORY_CONCURRENCY};

/// What a link is expected to point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Expect {
    /// A file or a directory, with an entry of its own.
    Entry,
    /// An inner bucket of a HAMT, contributing its children to the
    /// directory above.
    SubBucket,
}

/// Produces the entries of `node` and everything below it.
pub(super) fn resolve<BS>(
    block_service: BS,
    node: DagNode,
    digest: B3Digest,
    path: String,
    expect: Expect,
) -> BoxStream<'static, Result<ExportEntry, ExportError>>
where
    BS: BlockService + Clone + 'static,
{
    match (node.kind(), expect) {
        (NodeKind::File { .. }, Expect::Entry) => {
            let size = node.kind().file_size().unwrap_or_default();
            let content = file::content(block_service, node, digest.clone());

            stream::once(ready(Ok(ExportEntry::File {
                path,
                digest,
                size,
                content,
            })))
            .boxed()
        }
        (NodeKind::FlatDirectory | NodeKind::HamtShardedDirectory { .. }, Expect::Entry) => {
            let (_, links) = node.into_parts();
            let marker = ExportEntry::Directory {
                path: path.clone(),
                digest: digest.clone(),
            };

            stream::once(ready(Ok(marker)))
                .chain(children(block_service, links, path))
                .boxed()
        }
        (NodeKind::HamtShardedDirectory { .. }, Expect::SubBucket) => {
            let (_, links) = node.into_parts();
            children(block_service, links, path)
        }
        (_, Expect::SubBucket) => stream::once(ready(Err(ExportError::invalid(
            &digest,
            "unnamed directory link to a node which is no HAMT bucket",
        ))))
        .boxed(),
    }
}

/// Produces the entries below a directory, in link order.
///
/// Up to [DIRECTORY_CONCURRENCY] children get fetched ahead of the one being
/// yielded.
fn children<BS>(
    block_service: BS,
    links: Vec<Link>,
    path: String,
) -> BoxStream<'static, Result<ExportEntry, ExportError>>
where
    BS: BlockService + Clone + 'static,
{
    let fetches = stream::iter(links).map({
        let block_service = block_service.clone();
        move |link| {
            let block_service = block_service.clone();
            let path = path.clone();
            async move {
                let (path, expect) = match link.name {
                    Some(name) => (format!("{}/{}", path, name), Expect::Entry),
                    None => (path, Expect::SubBucket),
                };

                let node = fetch_node(&block_service, &link.digest).await?;
                Ok((node, link.digest, path, expect))
            }
        }
    });

    fetches
        .buffered(DIRECTORY_CONCURRENCY)
        .map(move |fetched| match fetched {
            Ok((node, digest, path, expect)) => {
                resolve(block_service.clone(), node, digest, path, expect)
            }
            Err(e) => stream::once(ready(Err(e))).boxed(),
        })
        .flatten()
        .boxed()
}
