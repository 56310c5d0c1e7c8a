use crate::{nodes::DecodeError, B3Digest, Error as StoreError};

/// Errors produced while exporting.
/// Each of them ends the export stream, the entries before stay valid.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("node {0} not found")]
    NotFound(B3Digest),

    #[error("node {digest} has unknown kind {kind}")]
    UnknownNodeKind { digest: B3Digest, kind: i32 },

    #[error("node {digest} is invalid: {msg}")]
    InvalidNode { digest: B3Digest, msg: String },

    #[error("failed to fetch node {0}: {1}")]
    Store(B3Digest, StoreError),

    #[error("unable to write {0:?}: {1}")]
    Io(std::path::PathBuf, std::io::Error),
}

impl ExportError {
    pub(crate) fn invalid(digest: &B3Digest, msg: impl Into<String>) -> Self {
        Self::InvalidNode {
            digest: digest.clone(),
            msg: msg.into(),
        }
    }

    pub(crate) fn from_decode(digest: &B3Digest, e: DecodeError) -> Self {
        match e {
            DecodeError::UnknownNodeKind(kind) => Self::UnknownNodeKind {
                digest: digest.clone(),
                kind,
            },
            e => Self::invalid(digest, e.to_string()),
        }
    }
}
