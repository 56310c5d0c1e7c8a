//! This contains test scenarios that a given [BlockService] needs to pass.
//! We use [rstest] and [rstest_reuse] to provide all services we want to test
//! against, and then apply this template to all test functions.

use bytes::Bytes;
use rstest::*;
use rstest_reuse::{self, *};

use super::BlockService;
use crate::blockservice;
use crate::fixtures::{BLOB_B, DUMMY_DIGEST, HELLOWORLD_FILE_DIGEST, HELLOWORLD_FILE_NODE};
use crate::B3Digest;

/// This produces a template, which will be applied to all individual test functions.
/// See https://github.com/la10736/rstest/issues/130#issuecomment-968864832
#[template]
#[rstest]
#[case::memory(blockservice::from_addr("memory://").await.unwrap())]
#[case::redb(blockservice::from_addr("redb://").await.unwrap())]
pub fn block_services(#[case] block_service: impl BlockService) {}

/// Using get() on a block that doesn't exist.
#[apply(block_services)]
#[tokio::test]
async fn not_found(block_service: impl BlockService) {
    assert_eq!(None, block_service.get(&DUMMY_DIGEST).await.unwrap());
}

/// Put a node, get it back, and ensure the digests match.
#[apply(block_services)]
#[tokio::test]
async fn put_get(block_service: impl BlockService) {
    let data = HELLOWORLD_FILE_NODE.encode();

    let digest = block_service.put(data.clone()).await.unwrap();
    assert_eq!(*HELLOWORLD_FILE_DIGEST, digest, "returned digest must match");

    assert_eq!(Some(data), block_service.get(&digest).await.unwrap());
}

/// Putting the same block twice is idempotent.
#[apply(block_services)]
#[tokio::test]
async fn put_twice(block_service: impl BlockService) {
    let data = Bytes::from_static(b"foo");

    let digest_1 = block_service.put(data.clone()).await.unwrap();
    let digest_2 = block_service.put(data.clone()).await.unwrap();

    assert_eq!(digest_1, digest_2);
    assert_eq!(Some(data), block_service.get(&digest_1).await.unwrap());
}

/// Blocks aren't required to be nodes.
#[apply(block_services)]
#[tokio::test]
async fn put_large(block_service: impl BlockService) {
    let digest = block_service.put(BLOB_B.clone()).await.unwrap();

    assert_eq!(B3Digest::of(&BLOB_B), digest);
    assert_eq!(
        Some(BLOB_B.clone()),
        block_service.get(&digest).await.unwrap()
    );
}
