//! Protobuf messages making up the on-disk node format.
//!
//! The outer envelope ([Node], [Link]) is the dag-pb layout, the node metadata
//! carried in [Node::data] is a serialized [Data] message. The messages are
//! declared directly through the prost derives, so no protoc is needed at
//! build time.
//!
//! These types are not validated. Use [crate::nodes::DagNode] to get a
//! checked view.

/// A single node in the DAG.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    /// Serialized [Data] message.
    #[prost(bytes = "bytes", optional, tag = "1")]
    pub data: ::core::option::Option<::prost::bytes::Bytes>,

    /// Ordered list of links to child nodes.
    #[prost(message, repeated, tag = "2")]
    pub links: ::prost::alloc::vec::Vec<Link>,
}

/// A link from a [Node] to one of its children.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Link {
    /// The digest of the encoded child node.
    #[prost(bytes = "bytes", optional, tag = "1")]
    pub hash: ::core::option::Option<::prost::bytes::Bytes>,

    /// Name of the child. Unset for the anonymous links pointing to HAMT
    /// sub-buckets and file blocks.
    #[prost(string, optional, tag = "2")]
    pub name: ::core::option::Option<::prost::alloc::string::String>,

    /// Cumulative size of the child node and everything below it.
    #[prost(uint64, optional, tag = "3")]
    pub tsize: ::core::option::Option<u64>,
}

/// The metadata describing what kind of node this is.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(enumeration = "data::DataType", tag = "1")]
    pub r#type: i32,

    /// Inline file contents for files, the slot bitfield for HAMT shards.
    #[prost(bytes = "bytes", optional, tag = "2")]
    pub data: ::core::option::Option<::prost::bytes::Bytes>,

    /// Logical length of the file below this node.
    #[prost(uint64, optional, tag = "3")]
    pub filesize: ::core::option::Option<u64>,

    /// Logical length below each link, in link order.
    #[prost(uint64, repeated, packed = "false", tag = "4")]
    pub blocksizes: ::prost::alloc::vec::Vec<u64>,

    /// Identifies the hash function that indexed a HAMT shard.
    #[prost(uint64, optional, tag = "5")]
    pub hash_type: ::core::option::Option<u64>,

    /// Table width of a HAMT shard.
    #[prost(uint64, optional, tag = "6")]
    pub fanout: ::core::option::Option<u64>,
}

/// Nested types of [Data].
pub mod data {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum DataType {
        Raw = 0,
        Directory = 1,
        File = 2,
        Metadata = 3,
        Symlink = 4,
        HamtShard = 5,
    }
}
