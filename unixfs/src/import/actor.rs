//! Owns the [TreeBuilder] of an import in a task of its own, and serializes
//! all mutations to it through a channel.
use tokio::sync::{mpsc, oneshot};
use tracing::{instrument, warn, Instrument};

use crate::blockservice::BlockService;
use crate::Error;

use super::tree::{Sealed, TreeBuilder};
use super::{ImportError, ImportRecord};

enum Command {
    InsertFile {
        path: String,
        file: Sealed,
        reply: oneshot::Sender<Result<(), ImportError>>,
    },
    InsertDir {
        path: String,
        reply: oneshot::Sender<Result<(), ImportError>>,
    },
    Flush {
        records: mpsc::Sender<Result<ImportRecord, ImportError>>,
        reply: oneshot::Sender<Result<Option<Sealed>, ImportError>>,
    },
}

/// A handle to the task owning the tree.
pub(crate) struct TreeHandle {
    commands: mpsc::Sender<Command>,
}

impl TreeHandle {
    /// Spawns the task. It exits once the handle is dropped.
    pub(crate) fn spawn<BS>(tree: TreeBuilder, block_service: BS) -> Self
    where
        BS: BlockService + 'static,
    {
        // Only ever one outstanding command.
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run(tree, block_service, rx).in_current_span());

        Self { commands: tx }
    }

    pub(crate) async fn insert_file(&self, path: String, file: Sealed) -> Result<(), ImportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::InsertFile { path, file, reply }).await;
        Self::recv(rx).await
    }

    pub(crate) async fn insert_dir(&self, path: String) -> Result<(), ImportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::InsertDir { path, reply }).await;
        Self::recv(rx).await
    }

    /// Seals all changed directories, stores their nodes and sends a record
    /// for each of them to `records`, children before parents.
    ///
    /// Returns the root of the import, if there's one.
    pub(crate) async fn flush(
        &self,
        records: mpsc::Sender<Result<ImportRecord, ImportError>>,
    ) -> Result<Option<Sealed>, ImportError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush { records, reply }).await;
        Self::recv(rx).await
    }

    async fn send(&self, command: Command) {
        self.commands
            .send(command)
            .await
            .unwrap_or_else(|_| panic!("Tvix bug: tree task gone"))
    }

    async fn recv<T>(rx: oneshot::Receiver<T>) -> T {
        rx.await.expect("Tvix bug: tree task dropped reply")
    }
}

async fn run<BS>(mut tree: TreeBuilder, block_service: BS, mut commands: mpsc::Receiver<Command>)
where
    BS: BlockService,
{
    while let Some(command) = commands.recv().await {
        // A failed send means the caller went away, there's nobody to tell.
        match command {
            Command::InsertFile { path, file, reply } => {
                let _ = reply.send(tree.insert_file(&path, file));
            }
            Command::InsertDir { path, reply } => {
                let _ = reply.send(tree.insert_dir(&path));
            }
            Command::Flush { records, reply } => {
                let _ = reply.send(flush(&mut tree, &block_service, &records).await);
            }
        }
    }
}

#[instrument(skip_all, err)]
async fn flush<BS>(
    tree: &mut TreeBuilder,
    block_service: &BS,
    records: &mpsc::Sender<Result<ImportRecord, ImportError>>,
) -> Result<Option<Sealed>, ImportError>
where
    BS: BlockService,
{
    for id in tree.flush_order()? {
        let (record, nodes) = tree.seal(id)?;

        // The directory node comes last, after the sub-buckets it links to.
        for node in nodes {
            let digest = block_service
                .put(node.data)
                .await
                .map_err(|e| ImportError::Store(record.path.clone(), e))?;
            if digest != node.digest {
                return Err(ImportError::Store(
                    record.path,
                    Error::DigestMismatch {
                        expected: node.digest,
                        actual: digest,
                    },
                ));
            }
        }

        if records.send(Ok(record)).await.is_err() {
            warn!("record receiver dropped, stopping flush");
            return Ok(None);
        }
    }

    Ok(tree.root())
}
