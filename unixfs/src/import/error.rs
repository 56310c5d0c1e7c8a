use crate::{hamt::HashError, nodes::DecodeError, Error as StoreError};

/// Represents all error types emitted by [super::import].
/// Each of them is terminal: the record stream ends after yielding it, but
/// the records emitted before stay valid.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("invalid input at {0:?}: {1}")]
    InvalidInput(String, String),

    #[error("detected more than one root, wrap them in a directory")]
    AmbiguousRoot,

    #[error("failed to store {0:?}: {1}")]
    Store(String, StoreError),

    #[error("failed to hash name: {0}")]
    Hash(#[from] HashError),

    #[error("unable to read contents for {0:?}: {1}")]
    ContentRead(String, std::io::Error),

    #[error("invalid import options: {0}")]
    InvalidOptions(String),

    #[error("failed to build node: {0}")]
    Node(#[from] DecodeError),

    #[error("block upload join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl ImportError {
    pub(crate) fn invalid_input(path: &str, msg: impl Into<String>) -> Self {
        Self::InvalidInput(path.to_owned(), msg.into())
    }
}
