use thiserror::Error;
use tokio::task::JoinError;

use crate::B3Digest;

/// Errors related to communication with a [crate::blockservice::BlockService].
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal storage error: {0}")]
    StorageError(String),

    #[error("block {expected} has digest {actual}")]
    DigestMismatch {
        expected: B3Digest,
        actual: B3Digest,
    },
}

impl From<JoinError> for Error {
    fn from(value: JoinError) -> Self {
        Error::StorageError(value.to_string())
    }
}

/// redb has a separate error type for every step, all of which are storage
/// errors for us.
macro_rules! impl_from_redb {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Error {
                fn from(value: $ty) -> Self {
                    Error::StorageError(value.to_string())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::InvalidRequest(msg) => Self::new(std::io::ErrorKind::InvalidInput, msg),
            e => Self::new(std::io::ErrorKind::Other, e.to_string()),
        }
    }
}
