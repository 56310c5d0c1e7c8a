//! The main library function here is [import], receiving a stream of
//! [ImportEntry] and producing a stream of [ImportRecord], one for every file
//! and directory stored.
//!
//! Specific ways of producing entries, such as walking the filesystem, live in
//! child modules.
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument};

use crate::blockservice::BlockService;
use crate::chunker::{Chunker, FixedSizeChunker, DEFAULT_CHUNK_SIZE};
use crate::hamt::{BucketOptions, HashFunction, Murmur3Hasher, DEFAULT_FANOUT};
use crate::nodes::is_valid_name;
use crate::B3Digest;

mod actor;
mod dir;
mod error;
mod file;
mod tree;
mod upload;

pub mod fs;

pub use error::ImportError;

use actor::TreeHandle;
use tree::{Sealed, TreeBuilder};

/// The default number of links per file node, keeping nodes of a full layer
/// below 8KiB.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Number of files read and stored concurrently.
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Directories with at least this many entries get sharded.
pub const DEFAULT_SHARD_SPLIT_THRESHOLD: usize = 1000;

/// Configures an [import].
///
/// All fields but the hash function and the chunker can be deserialized,
/// for example from the query string of an URL with `serde_qs`.
#[derive(Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportOptions {
    /// Put everything into a directory, even if there's a single root.
    pub wrap: bool,

    /// Number of entries at which a directory gets turned into a HAMT.
    /// `usize::MAX` disables sharding, 0 shards every directory.
    pub shard_split_threshold: usize,

    /// Table width of the HAMT nodes.
    pub fanout: u64,

    /// Block size used if no other chunker is set.
    pub chunk_size: usize,

    /// Maximum number of links of a file node.
    pub max_links: usize,

    /// Number of files processed concurrently.
    pub concurrency: usize,

    /// Places names in HAMT slots.
    #[serde(skip, default = "default_hash_fn")]
    pub hash_fn: Arc<dyn HashFunction>,

    /// Overrides the [FixedSizeChunker] built from `chunk_size`.
    #[serde(skip)]
    pub chunker: Option<Arc<dyn Chunker>>,
}

fn default_hash_fn() -> Arc<dyn HashFunction> {
    Arc::new(Murmur3Hasher)
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            wrap: false,
            shard_split_threshold: DEFAULT_SHARD_SPLIT_THRESHOLD,
            fanout: DEFAULT_FANOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_MAX_LINKS,
            concurrency: DEFAULT_CONCURRENCY,
            hash_fn: default_hash_fn(),
            chunker: None,
        }
    }
}

impl std::fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportOptions")
            .field("wrap", &self.wrap)
            .field("shard_split_threshold", &self.shard_split_threshold)
            .field("fanout", &self.fanout)
            .field("chunk_size", &self.chunk_size)
            .field("max_links", &self.max_links)
            .field("concurrency", &self.concurrency)
            .field("hash_type", &self.hash_fn.hash_type())
            .finish_non_exhaustive()
    }
}

impl ImportOptions {
    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_shard_split_threshold(mut self, threshold: usize) -> Self {
        self.shard_split_threshold = threshold;
        self
    }

    pub fn with_fanout(mut self, fanout: u64) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_links(mut self, max_links: usize) -> Self {
        self.max_links = max_links;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_hash_fn(mut self, hash_fn: Arc<dyn HashFunction>) -> Self {
        self.hash_fn = hash_fn;
        self
    }

    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    fn bucket_options(&self) -> Result<BucketOptions, ImportError> {
        BucketOptions::new(self.hash_fn.clone(), self.fanout)
            .map_err(|e| ImportError::InvalidOptions(e.to_string()))
    }

    fn chunker(&self) -> Result<Arc<dyn Chunker>, ImportError> {
        if let Some(chunker) = &self.chunker {
            return Ok(chunker.clone());
        }
        if self.chunk_size == 0 {
            return Err(ImportError::InvalidOptions("chunk size must be positive".into()));
        }
        Ok(Arc::new(FixedSizeChunker::new(self.chunk_size)))
    }

    fn validate(&self) -> Result<(), ImportError> {
        if self.max_links < 2 {
            return Err(ImportError::InvalidOptions(
                "file nodes need at least 2 links".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ImportError::InvalidOptions(
                "concurrency must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// One element of the input of an [import].
pub enum ImportEntry {
    /// A file at `path`, with its contents read from `content`.
    File {
        path: String,
        content: Box<dyn AsyncRead + Send + Unpin>,
    },
    /// Ensures a directory exists at `path`, even if nothing is put into it.
    Dir { path: String },
}

impl ImportEntry {
    pub fn file(path: impl Into<String>, content: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::File {
            path: path.into(),
            content: Box::new(content),
        }
    }

    /// A file with its contents in memory.
    pub fn bytes(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self::file(path, std::io::Cursor::new(content.into()))
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self::Dir { path: path.into() }
    }
}

impl std::fmt::Debug for ImportEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportEntry::File { path, .. } => f.debug_struct("File").field("path", path).finish(),
            ImportEntry::Dir { path } => f.debug_struct("Dir").field("path", path).finish(),
        }
    }
}

/// A file or directory stored by an [import].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    /// The path of the entry, with segments separated by `/`. Empty for the
    /// wrapping directory.
    pub path: String,

    /// The address of the root node of the entry.
    pub digest: B3Digest,

    /// The DAG size of the entry, which is the sum of the encoded sizes of
    /// all nodes below and including its root node.
    pub size: u64,
}

/// An entry with its contents stored.
enum Prepared {
    File { path: String, file: Sealed },
    Dir { path: String },
}

/// Imports a stream of entries into the [BlockService].
///
/// Files get chunked and stored as they are read, up to
/// [ImportOptions::concurrency] at the same time. Each of them produces a
/// record once it's in the tree, in the order of the input. Once the input
/// ends, all directories are encoded and stored, children before parents.
/// The directory containing everything is only stored and returned if
/// [ImportOptions::wrap] is set. Otherwise, there must be a single
/// top-level entry, the last record emitted.
///
/// The first error, including the ones produced by `entries`, is the last
/// element of the stream.
pub fn import<BS, S>(
    block_service: BS,
    entries: S,
    options: ImportOptions,
) -> BoxStream<'static, Result<ImportRecord, ImportError>>
where
    BS: BlockService + Clone + 'static,
    S: Stream<Item = Result<ImportEntry, ImportError>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        if let Err(e) = run_import(block_service, entries, options, tx.clone()).await {
            let _ = tx.send(Err(e)).await;
        }
    });

    ReceiverStream::new(rx).boxed()
}

#[instrument(skip(block_service, entries, records), err)]
async fn run_import<BS, S>(
    block_service: BS,
    entries: S,
    options: ImportOptions,
    records: mpsc::Sender<Result<ImportRecord, ImportError>>,
) -> Result<(), ImportError>
where
    BS: BlockService + Clone + 'static,
    S: Stream<Item = Result<ImportEntry, ImportError>> + Send + 'static,
{
    options.validate()?;
    let chunker = options.chunker()?;
    let tree = TreeHandle::spawn(
        TreeBuilder::new(
            options.bucket_options()?,
            options.shard_split_threshold,
            options.wrap,
        ),
        block_service.clone(),
    );
    let upload_semaphore = Arc::new(Semaphore::new(upload::MAX_BUFFER_SIZE));

    let mut prepared = entries
        .map(|entry| {
            let block_service = block_service.clone();
            let chunker = chunker.clone();
            let upload_semaphore = upload_semaphore.clone();
            let max_links = options.max_links;

            async move {
                match entry? {
                    ImportEntry::File { path, content } => {
                        let path = normalize_path(&path)?;
                        if path.is_empty() {
                            return Err(ImportError::invalid_input(&path, "file without name"));
                        }

                        let file = file::import_file(
                            block_service,
                            chunker.as_ref(),
                            content,
                            max_links,
                            upload_semaphore,
                            &path,
                        )
                        .await?;

                        Ok(Prepared::File { path, file })
                    }
                    ImportEntry::Dir { path } => Ok(Prepared::Dir {
                        path: normalize_path(&path)?,
                    }),
                }
            }
        })
        .buffered(options.concurrency)
        .boxed();

    while let Some(prepared) = prepared.next().await {
        match prepared? {
            Prepared::File { path, file } => {
                tree.insert_file(path.clone(), file.clone()).await?;

                let record = ImportRecord {
                    path,
                    digest: file.digest,
                    size: file.size,
                };
                if records.send(Ok(record)).await.is_err() {
                    debug!("record receiver dropped, stopping import");
                    return Ok(());
                }
            }
            Prepared::Dir { path } => tree.insert_dir(path).await?,
        }
    }

    let root = tree.flush(records).await?;
    debug!(root.digest = ?root.map(|r| r.digest), "import done");

    Ok(())
}

/// Drops empty segments, and checks all others are valid names.
fn normalize_path(path: &str) -> Result<String, ImportError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(invalid) = segments.iter().find(|s| !is_valid_name(s)) {
        return Err(ImportError::invalid_input(
            path,
            format!("invalid path segment {:?}", invalid),
        ));
    }

    Ok(segments.join("/"))
}
