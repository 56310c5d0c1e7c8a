//! Imports that deal with a real filesystem.
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::blockservice::BlockService;

use super::{import, ImportEntry, ImportError, ImportOptions, ImportRecord};

/// Imports the file or directory at `path` into the [BlockService].
///
/// Paths in the records are relative to the parent of `path`, so the last
/// record describes `path` itself, under its file name.
///
/// Symlinks and special files are not supported, and abort the import.
pub fn ingest_path<BS, P>(
    block_service: BS,
    path: P,
    options: ImportOptions,
) -> BoxStream<'static, Result<ImportRecord, ImportError>>
where
    BS: BlockService + Clone + 'static,
    P: AsRef<Path>,
{
    let root = path.as_ref().to_path_buf();
    let iter = WalkDir::new(&root)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter();

    import(block_service, dir_entries_to_import_stream(iter, root), options)
}

/// Converts an iterator of [walkdir::DirEntry]s into a stream of import
/// entries, which can then be fed into [import].
///
/// Files are only opened once the entry is polled.
pub fn dir_entries_to_import_stream<I>(
    iter: I,
    root: PathBuf,
) -> BoxStream<'static, Result<ImportEntry, ImportError>>
where
    I: Iterator<Item = Result<DirEntry, walkdir::Error>> + Send + 'static,
{
    let prefix = root.parent().map(Path::to_path_buf).unwrap_or_default();

    futures::stream::iter(iter)
        .then(move |entry| {
            let prefix = prefix.clone();
            async move {
                match entry {
                    Ok(entry) => dir_entry_to_import_entry(&entry, &prefix).await,
                    Err(e) => {
                        let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                        Err(ImportError::ContentRead(
                            path.to_string_lossy().into_owned(),
                            e.into(),
                        ))
                    }
                }
            }
        })
        .boxed()
}

/// Converts a [walkdir::DirEntry] into an [ImportEntry], opening the file if
/// it is one.
///
/// The prefix path is stripped from the path of each entry.
async fn dir_entry_to_import_entry(
    entry: &DirEntry,
    prefix: &Path,
) -> Result<ImportEntry, ImportError> {
    let path = entry
        .path()
        .strip_prefix(prefix)
        .expect("Tvix bug: failed to strip root path prefix")
        .to_str()
        .ok_or_else(|| {
            ImportError::invalid_input(&entry.path().to_string_lossy(), "path is not valid UTF-8")
        })?
        .to_owned();

    let file_type = entry.file_type();

    if file_type.is_dir() {
        Ok(ImportEntry::dir(path))
    } else if file_type.is_file() {
        let file = tokio::fs::File::open(entry.path())
            .await
            .map_err(|e| ImportError::ContentRead(path.clone(), e))?;

        Ok(ImportEntry::file(path, file))
    } else if file_type.is_symlink() {
        Err(ImportError::invalid_input(&path, "symlinks are not supported"))
    } else {
        Err(ImportError::invalid_input(
            &path,
            format!("unsupported file type {:?}", file_type),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::ingest_path;
    use crate::fixtures::HELLOWORLD_CONTENTS;
    use crate::import::{ImportError, ImportOptions};
    use crate::utils::gen_block_service;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn directory() {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path().join("root");
        std::fs::create_dir_all(root.join("sub/empty")).unwrap();
        std::fs::write(root.join("hello.txt"), HELLOWORLD_CONTENTS).unwrap();
        std::fs::write(root.join("sub/other.txt"), b"other").unwrap();

        let records: Vec<_> = ingest_path(gen_block_service(), &root, ImportOptions::default())
            .try_collect()
            .await
            .expect("must succeed");

        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(5, paths.len());
        assert_eq!(Some(&"root"), paths.last());
        assert!(paths.contains(&"root/hello.txt"));
        assert!(paths.contains(&"root/sub/other.txt"));
        assert!(paths.contains(&"root/sub/empty"));
        assert!(paths.contains(&"root/sub"));
    }

    #[tokio::test]
    async fn single_file() {
        let tmpdir = TempDir::new().unwrap();
        let file = tmpdir.path().join("hello.txt");
        std::fs::write(&file, HELLOWORLD_CONTENTS).unwrap();

        let records: Vec<_> = ingest_path(gen_block_service(), &file, ImportOptions::default())
            .try_collect()
            .await
            .expect("must succeed");

        assert_eq!(1, records.len());
        assert_eq!("hello.txt", records[0].path);
    }

    #[tokio::test]
    async fn symlink() {
        let tmpdir = TempDir::new().unwrap();
        let root = tmpdir.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink("/nix/store/somewhereelse", root.join("link")).unwrap();

        let result: Result<Vec<_>, _> =
            ingest_path(gen_block_service(), &root, ImportOptions::default())
                .try_collect()
                .await;

        assert!(matches!(result, Err(ImportError::InvalidInput(..))));
    }
}
