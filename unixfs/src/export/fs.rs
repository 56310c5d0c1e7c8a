//! Exports that write to a real filesystem.
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::blockservice::BlockService;
use crate::B3Digest;

use super::{export, ExportEntry, ExportError};

/// Writes the DAG below `root` to `dest`.
///
/// If `root` is a directory, `dest` becomes that directory, otherwise it
/// becomes the file. Existing files get overwritten.
#[instrument(skip(block_service, dest), fields(dest = %dest.as_ref().display()), err)]
pub async fn export_to_path<BS, P>(
    block_service: BS,
    root: B3Digest,
    dest: P,
) -> Result<(), ExportError>
where
    BS: BlockService + Clone + 'static,
    P: AsRef<Path>,
{
    let dest = dest.as_ref();
    let mut entries = export(block_service, root);

    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let path = local_path(dest, entry.path());

        match entry {
            ExportEntry::Directory { .. } => {
                debug!(path = %path.display(), "creating directory");
                tokio::fs::create_dir_all(&path)
                    .await
                    .map_err(|e| ExportError::Io(path.clone(), e))?;
            }
            ExportEntry::File { mut content, .. } => {
                debug!(path = %path.display(), "writing file");
                let io_err = |e| ExportError::Io(path.clone(), e);

                let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
                while let Some(chunk) = content.next().await {
                    file.write_all(&chunk?).await.map_err(io_err)?;
                }
                file.flush().await.map_err(io_err)?;
            }
        }
    }

    Ok(())
}

/// Replaces the first component of an exported path with `dest`.
fn local_path(dest: &Path, path: &str) -> PathBuf {
    match path.split_once('/') {
        Some((_, rest)) => dest.join(rest),
        None => dest.to_path_buf(),
    }
}
