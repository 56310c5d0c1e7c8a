//! Validated views of the nodes making up the DAG.
//!
//! A [DagNode] is what gets encoded into the [crate::proto::Node] wire format,
//! stored in a [crate::blockservice::BlockService] and addressed by the blake3
//! digest of its encoding.
use bytes::Bytes;
use prost::Message;
use std::collections::HashSet;

use crate::hamt::{self, popcount};
use crate::proto::{self, data::DataType};
use crate::B3Digest;

mod kind;
mod link;

pub use kind::NodeKind;
pub use link::{is_valid_name, Link};

/// Errors occuring when decoding or constructing a [DagNode].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("unable to decode protobuf: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("node has no metadata")]
    MissingData,

    #[error("unknown node kind {0}")]
    UnknownNodeKind(i32),

    #[error("invalid link at position {0}: {1}")]
    InvalidLink(usize, String),

    #[error("{0}")]
    InvalidFanout(#[from] hamt::InvalidFanout),

    #[error("invalid node: {0}")]
    Invalid(String),
}

/// A node in the DAG, consisting of its [NodeKind] and an ordered list of
/// [Link]s to its children.
///
/// Constructing one through [DagNode::new] or [DagNode::decode] checks the
/// links match what the kind describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagNode {
    kind: NodeKind,
    links: Vec<Link>,
}

/// A node in its encoded form, together with its address and DAG size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedNode {
    pub digest: B3Digest,
    pub data: Bytes,
    /// The encoded length plus the sizes of all links.
    pub size: u64,
}

impl DagNode {
    pub fn new(kind: NodeKind, links: Vec<Link>) -> Result<Self, DecodeError> {
        validate(&kind, &links)?;

        Ok(Self { kind, links })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn into_parts(self) -> (NodeKind, Vec<Link>) {
        (self.kind, self.links)
    }

    pub fn encode(&self) -> Bytes {
        let data = match &self.kind {
            NodeKind::File { data, block_sizes } => proto::Data {
                r#type: DataType::File.into(),
                data: data.clone(),
                filesize: self.kind.file_size(),
                blocksizes: block_sizes.clone(),
                ..Default::default()
            },
            NodeKind::FlatDirectory => proto::Data {
                r#type: DataType::Directory.into(),
                ..Default::default()
            },
            NodeKind::HamtShardedDirectory {
                fanout,
                hash_type,
                bitfield,
            } => proto::Data {
                r#type: DataType::HamtShard.into(),
                data: Some(bitfield.clone()),
                fanout: Some(*fanout),
                hash_type: Some(*hash_type),
                ..Default::default()
            },
        };

        proto::Node {
            data: Some(data.encode_to_vec().into()),
            links: self
                .links
                .iter()
                .map(|link| proto::Link {
                    hash: Some(link.digest.clone().into()),
                    name: link.name.clone(),
                    tsize: Some(link.size),
                })
                .collect(),
        }
        .encode_to_vec()
        .into()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let node = proto::Node::decode(buf)?;

        let data = proto::Data::decode(node.data.ok_or(DecodeError::MissingData)?)?;

        let kind = match DataType::try_from(data.r#type) {
            Ok(DataType::File) => {
                let kind = NodeKind::File {
                    data: data.data,
                    block_sizes: data.blocksizes,
                };
                if let Some(filesize) = data.filesize {
                    if Some(filesize) != kind.file_size() {
                        return Err(DecodeError::Invalid(format!(
                            "filesize {} doesn't match content",
                            filesize
                        )));
                    }
                }
                kind
            }
            Ok(DataType::Directory) => NodeKind::FlatDirectory,
            Ok(DataType::HamtShard) => NodeKind::HamtShardedDirectory {
                fanout: data
                    .fanout
                    .ok_or_else(|| DecodeError::Invalid("shard without fanout".into()))?,
                hash_type: data
                    .hash_type
                    .ok_or_else(|| DecodeError::Invalid("shard without hash type".into()))?,
                bitfield: data.data.unwrap_or_default(),
            },
            // We don't produce any of these.
            Ok(DataType::Raw | DataType::Metadata | DataType::Symlink) | Err(_) => {
                return Err(DecodeError::UnknownNodeKind(data.r#type))
            }
        };

        let links = node
            .links
            .into_iter()
            .enumerate()
            .map(|(i, link)| {
                let hash = link
                    .hash
                    .ok_or_else(|| DecodeError::InvalidLink(i, "missing hash".into()))?;
                let digest = B3Digest::try_from(hash)
                    .map_err(|e| DecodeError::InvalidLink(i, e.to_string()))?;

                Ok(Link {
                    name: link.name,
                    size: link
                        .tsize
                        .ok_or_else(|| DecodeError::InvalidLink(i, "missing size".into()))?,
                    digest,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Self::new(kind, links)
    }

    /// Encodes the node and calculates its address and DAG size.
    pub fn seal(&self) -> EncodedNode {
        let data = self.encode();

        EncodedNode {
            digest: B3Digest::of(&data),
            size: data.len() as u64 + self.links.iter().map(|l| l.size).sum::<u64>(),
            data,
        }
    }
}

fn validate(kind: &NodeKind, links: &[Link]) -> Result<(), DecodeError> {
    match kind {
        NodeKind::File { block_sizes, .. } => {
            if block_sizes.len() != links.len() {
                return Err(DecodeError::Invalid(format!(
                    "{} block sizes for {} links",
                    block_sizes.len(),
                    links.len()
                )));
            }
            if let Some(i) = links.iter().position(|l| l.name.is_some()) {
                return Err(DecodeError::InvalidLink(i, "file blocks can't be named".into()));
            }
        }
        NodeKind::FlatDirectory => {
            let mut seen = HashSet::with_capacity(links.len());
            for (i, link) in links.iter().enumerate() {
                check_name(i, link)?;
                if !seen.insert(link.name.as_deref()) {
                    return Err(DecodeError::InvalidLink(i, "duplicate name".into()));
                }
            }
        }
        NodeKind::HamtShardedDirectory {
            fanout, bitfield, ..
        } => {
            hamt::BucketOptions::validate_fanout(*fanout)?;

            let expected_len = (*fanout as usize).div_ceil(8);
            if bitfield.len() != expected_len {
                return Err(DecodeError::Invalid(format!(
                    "bitfield has {} bytes, expected {}",
                    bitfield.len(),
                    expected_len
                )));
            }
            if popcount(bitfield) != links.len() {
                return Err(DecodeError::Invalid(format!(
                    "bitfield marks {} slots, but there are {} links",
                    popcount(bitfield),
                    links.len()
                )));
            }
            for (i, link) in links.iter().enumerate() {
                if link.name.is_some() {
                    check_name(i, link)?;
                }
            }
        }
    }

    Ok(())
}

fn check_name(i: usize, link: &Link) -> Result<(), DecodeError> {
    match link.name.as_deref() {
        Some(name) if is_valid_name(name) => Ok(()),
        Some(name) => Err(DecodeError::InvalidLink(i, format!("invalid name {:?}", name))),
        None => Err(DecodeError::InvalidLink(i, "missing name".into())),
    }
}
