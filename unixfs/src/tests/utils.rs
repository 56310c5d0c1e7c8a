use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::blockservice::BlockService;
use crate::export::{export, ExportEntry, ExportError};
use crate::import::{import, ImportEntry, ImportError, ImportOptions, ImportRecord};
use crate::{B3Digest, Error};

/// A [BlockService] failing every request.
#[derive(Clone, Default)]
pub struct FailingBlockService;

#[async_trait::async_trait]
impl BlockService for FailingBlockService {
    async fn get(&self, _digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        Err(Error::StorageError("unavailable".into()))
    }

    async fn put(&self, _data: Bytes) -> Result<B3Digest, Error> {
        Err(Error::StorageError("unavailable".into()))
    }
}

/// Wraps a [BlockService], delaying each get by a few milliseconds depending
/// on the digest, so fetches complete out of order.
/// Keeps track of the highest number of gets in flight at the same time.
#[derive(Clone)]
pub struct DelayingBlockService<BS> {
    inner: BS,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl<BS> DelayingBlockService<BS> {
    pub fn new(inner: BS) -> Self {
        Self {
            inner,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<BS> BlockService for DelayingBlockService<BS>
where
    BS: BlockService,
{
    async fn get(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        let bytes: [u8; 32] = digest.clone().into();
        tokio::time::sleep(Duration::from_millis((bytes[0] % 7) as u64)).await;
        let result = self.inner.get(digest).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn put(&self, data: Bytes) -> Result<B3Digest, Error> {
        self.inner.put(data).await
    }
}

/// Imports the entries, collecting all records or the error ending the
/// import.
pub async fn import_all<BS>(
    block_service: BS,
    entries: Vec<ImportEntry>,
    options: ImportOptions,
) -> Result<Vec<ImportRecord>, ImportError>
where
    BS: BlockService + Clone + 'static,
{
    import(
        block_service,
        futures::stream::iter(entries.into_iter().map(Ok)),
        options,
    )
    .try_collect()
    .await
}

/// An exported entry with its content read. None for directories.
pub type Exported = (String, Option<Vec<u8>>);

/// Exports everything below `root`, reading the contents of all files.
pub async fn export_all<BS>(block_service: BS, root: B3Digest) -> Result<Vec<Exported>, ExportError>
where
    BS: BlockService + Clone + 'static,
{
    let mut entries = export(block_service, root);
    let mut exported = Vec::new();

    while let Some(entry) = entries.next().await {
        match entry? {
            ExportEntry::Directory { path, .. } => exported.push((path, None)),
            ExportEntry::File {
                path,
                size,
                content,
                ..
            } => {
                let chunks: Vec<Bytes> = content.try_collect().await?;
                let content = chunks.concat();
                assert_eq!(size, content.len() as u64, "size of {}", path);
                exported.push((path, Some(content)));
            }
        }
    }

    Ok(exported)
}

/// Strips the root from all paths, so exports of different roots compare
/// equal.
pub fn relative(exported: Vec<Exported>) -> BTreeMap<String, Option<Vec<u8>>> {
    exported
        .into_iter()
        .map(|(path, content)| {
            let path = path.split_once('/').map(|(_, p)| p).unwrap_or_default();
            (path.to_owned(), content)
        })
        .collect()
}
