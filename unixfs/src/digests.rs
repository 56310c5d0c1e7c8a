use bytes::Bytes;
use data_encoding::HEXLOWER;
use std::str::FromStr;
use thiserror::Error;

/// The address of an encoded node, which is the blake3 digest over its
/// protobuf encoding.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct B3Digest(Bytes);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLen(usize),

    #[error("invalid digest encoding: {0}")]
    InvalidEncoding(String),
}

pub const B3_LEN: usize = 32;

/// The prefix used when printing and parsing digests.
const DISPLAY_PREFIX: &str = "b3:";

impl B3Digest {
    /// Calculates the digest of the passed data.
    pub fn of(data: &[u8]) -> Self {
        blake3::hash(data).into()
    }
}

impl From<B3Digest> for bytes::Bytes {
    fn from(val: B3Digest) -> Self {
        val.0
    }
}

impl From<blake3::Hash> for B3Digest {
    fn from(value: blake3::Hash) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl TryFrom<Vec<u8>> for B3Digest {
    type Error = Error;

    // constructs a [B3Digest] from a [Vec<u8>].
    // Returns an error if the digest has the wrong length.
    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() != B3_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value.into()))
        }
    }
}

impl TryFrom<bytes::Bytes> for B3Digest {
    type Error = Error;

    // constructs a [B3Digest] from a [bytes::Bytes].
    // Returns an error if the digest has the wrong length.
    fn try_from(value: bytes::Bytes) -> Result<Self, Self::Error> {
        if value.len() != B3_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<&[u8; B3_LEN]> for B3Digest {
    fn from(value: &[u8; B3_LEN]) -> Self {
        Self(value.to_vec().into())
    }
}

impl From<B3Digest> for [u8; B3_LEN] {
    fn from(value: B3Digest) -> Self {
        let mut out = [0u8; B3_LEN];
        out.copy_from_slice(&value.0);
        out
    }
}

impl Clone for B3Digest {
    fn clone(&self) -> Self {
        Self(self.0.to_owned())
    }
}

/// Parses `b3:<hex>`, the format produced by [std::fmt::Display].
/// The prefix is optional.
impl FromStr for B3Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix(DISPLAY_PREFIX).unwrap_or(s);
        let decoded = HEXLOWER
            .decode(hex.to_ascii_lowercase().as_bytes())
            .map_err(|e| Error::InvalidEncoding(e.to_string()))?;

        decoded.try_into()
    }
}

impl std::fmt::Display for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", DISPLAY_PREFIX, HEXLOWER.encode(&self.0))
    }
}

impl std::fmt::Debug for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", DISPLAY_PREFIX, HEXLOWER.encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::{B3Digest, Error};
    use rstest::rstest;

    #[test]
    fn display_parse() {
        let digest = B3Digest::of(b"Hello World!");
        let s = digest.to_string();

        assert!(s.starts_with("b3:"));
        assert_eq!(digest, s.parse::<B3Digest>().expect("must parse"));
    }

    #[rstest]
    #[case::too_short("b3:00ff")]
    #[case::not_hex("b3:zz")]
    #[case::odd_length("b3:abc")]
    fn parse_invalid(#[case] input: &str) {
        match input.parse::<B3Digest>() {
            Err(Error::InvalidDigestLen(_)) | Err(Error::InvalidEncoding(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parse_without_prefix() {
        let digest = B3Digest::of(b"");
        let hex = digest.to_string();
        let hex = hex.strip_prefix("b3:").unwrap();

        assert_eq!(digest, hex.parse::<B3Digest>().unwrap());
    }
}
