use bytes::Bytes;
use redb::{Database, ReadableTable, TableDefinition};
use std::{path::PathBuf, sync::Arc};
use tracing::{instrument, warn};

use super::BlockService;
use crate::{digests, B3Digest, Error};

const BLOCK_TABLE: TableDefinition<[u8; digests::B3_LEN], Vec<u8>> = TableDefinition::new("block");

#[derive(Clone)]
pub struct RedbBlockService {
    // We wrap the db in an Arc to be able to move it into spawn_blocking,
    // as discussed in https://github.com/cberner/redb/issues/789
    db: Arc<Database>,
}

impl RedbBlockService {
    /// Constructs a new instance using the specified filesystem path for
    /// storage.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if path == PathBuf::from("/") {
            return Err(Error::StorageError(
                "cowardly refusing to open / with redb".to_string(),
            ));
        }

        let db = tokio::task::spawn_blocking(|| -> Result<_, redb::Error> {
            let db = redb::Database::create(path)?;
            create_schema(&db)?;
            Ok(db)
        })
        .await??;

        Ok(Self { db: Arc::new(db) })
    }

    /// Constructs a new instance using the in-memory backend.
    pub fn new_temporary() -> Result<Self, Error> {
        let db =
            redb::Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;

        create_schema(&db)?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Ensures all tables are present.
fn create_schema(db: &redb::Database) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    txn.open_table(BLOCK_TABLE)?;
    txn.commit()?;

    Ok(())
}

#[async_trait::async_trait]
impl BlockService for RedbBlockService {
    #[instrument(skip(self, digest), fields(block.digest=%digest))]
    async fn get(&self, digest: &B3Digest) -> Result<Option<Bytes>, Error> {
        let db = self.db.clone();
        let key: [u8; digests::B3_LEN] = digest.to_owned().into();

        let data = tokio::task::spawn_blocking(move || -> Result<_, redb::Error> {
            let txn = db.begin_read()?;
            let table = txn.open_table(BLOCK_TABLE)?;
            Ok(table.get(key)?.map(|v| v.value()))
        })
        .await?
        .map_err(|e| {
            warn!(err=%e, "failed to retrieve block");
            Error::StorageError("failed to retrieve block".to_string())
        })?;

        let data = match data {
            None => return Ok(None),
            Some(data) => Bytes::from(data),
        };

        // We check that the digest of the retrieved block matches the expected digest.
        let actual_digest = B3Digest::of(&data);
        if &actual_digest != digest {
            warn!(block.actual_digest=%actual_digest, "requested block got the wrong digest");
            return Err(Error::DigestMismatch {
                expected: digest.clone(),
                actual: actual_digest,
            });
        }

        Ok(Some(data))
    }

    #[instrument(skip_all, fields(block.size=data.len()))]
    async fn put(&self, data: Bytes) -> Result<B3Digest, Error> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || {
            let digest = B3Digest::of(&data);

            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(BLOCK_TABLE)?;
                let key: [u8; digests::B3_LEN] = digest.clone().into();
                if table.get(key)?.is_none() {
                    table.insert(key, data.to_vec())?;
                }
            }
            txn.commit()?;

            Ok(digest)
        })
        .await?
    }
}
