use bytes::Bytes;
use rstest::rstest;
use std::collections::BTreeMap;

use super::utils::{export_all, import_all, relative};
use crate::blockservice::{BlockService, MemoryBlockService};
use crate::fixtures::{BEST_BYTES_CONTENTS, BLOB_B, HELLOWORLD_CONTENTS};
use crate::hamt::{popcount, Murmur3Hasher};
use crate::import::{ImportEntry, ImportOptions};
use crate::nodes::{DagNode, NodeKind};
use crate::utils::gen_block_service;

/// Entries below "root", and what an export of "root" contains.
fn sample_tree() -> (Vec<ImportEntry>, BTreeMap<String, Option<Vec<u8>>>) {
    let mut entries = vec![
        ImportEntry::bytes("root/hello.txt", HELLOWORLD_CONTENTS),
        ImportEntry::dir("root/empty"),
        ImportEntry::bytes("root/nested/deep/best", BEST_BYTES_CONTENTS),
        ImportEntry::bytes("root/big", BLOB_B.clone()),
    ];
    let mut expected: BTreeMap<String, Option<Vec<u8>>> = [
        ("", None),
        ("hello.txt", Some(HELLOWORLD_CONTENTS.to_vec())),
        ("empty", None),
        ("nested", None),
        ("nested/deep", None),
        ("nested/deep/best", Some(BEST_BYTES_CONTENTS.to_vec())),
        ("big", Some(BLOB_B.to_vec())),
        ("many", None),
    ]
    .into_iter()
    .map(|(p, c)| (p.to_owned(), c))
    .collect();

    for i in 0..40 {
        let path = format!("many/file-{}", i);
        let content = format!("content of file {}", i).into_bytes();
        entries.push(ImportEntry::bytes(format!("root/{}", path), content.clone()));
        expected.insert(path, Some(content));
    }

    (entries, expected)
}

#[rstest]
#[case::never_shard(usize::MAX)]
#[case::always_shard(0)]
#[case::small_threshold(3)]
#[case::default_threshold(1000)]
#[tokio::test]
async fn roundtrip(#[case] threshold: usize) {
    let block_service = gen_block_service();
    let (entries, expected) = sample_tree();

    let records = import_all(
        block_service.clone(),
        entries,
        ImportOptions::default().with_shard_split_threshold(threshold),
    )
    .await
    .expect("import must succeed");

    let root = records.last().expect("must have records");
    assert_eq!("root", root.path);

    let exported = export_all(block_service, root.digest.clone())
        .await
        .expect("export must succeed");

    assert_eq!(root.digest.to_string(), exported[0].0);
    assert_eq!(expected, relative(exported));
}

/// Every directory is exported exactly once, no matter how many buckets it
/// is spread over.
#[rstest]
#[case::never_shard(usize::MAX)]
#[case::always_shard(0)]
#[case::small_threshold(5)]
#[tokio::test]
async fn one_entry_per_path(#[case] threshold: usize) {
    let block_service = gen_block_service();
    let (entries, expected) = sample_tree();

    let records = import_all(
        block_service.clone(),
        entries,
        ImportOptions::default().with_shard_split_threshold(threshold),
    )
    .await
    .expect("import must succeed");

    let exported = export_all(block_service, records.last().unwrap().digest.clone())
        .await
        .expect("export must succeed");

    let mut paths: Vec<_> = exported.iter().map(|(path, _)| path.as_str()).collect();
    assert_eq!(expected.len(), paths.len());
    paths.sort();
    paths.dedup();
    assert_eq!(expected.len(), paths.len(), "paths must be unique");

    let markers = exported.iter().filter(|(_, content)| content.is_none()).count();
    // root, empty, many, nested, nested/deep
    assert_eq!(5, markers);
}

/// Sharding changes the addresses of directories, but not what they contain.
#[tokio::test]
async fn threshold_sensitivity() {
    let mut roots = Vec::new();
    let mut exports = Vec::new();

    for threshold in [usize::MAX, 0] {
        let block_service = gen_block_service();
        let records = import_all(
            block_service.clone(),
            sample_tree().0,
            ImportOptions::default().with_shard_split_threshold(threshold),
        )
        .await
        .expect("import must succeed");
        let root = records.last().unwrap().digest.clone();

        exports.push(relative(export_all(block_service, root.clone()).await.unwrap()));
        roots.push(root);
    }

    assert_ne!(roots[0], roots[1]);
    assert_eq!(exports[0], exports[1]);
}

/// No directory record comes before a record of something below it, and no
/// exported entry comes before the directory containing it.
#[rstest]
#[case::never_shard(usize::MAX)]
#[case::always_shard(0)]
#[tokio::test]
async fn order(#[case] threshold: usize) {
    let block_service = gen_block_service();
    let records = import_all(
        block_service.clone(),
        sample_tree().0,
        ImportOptions::default().with_shard_split_threshold(threshold),
    )
    .await
    .expect("import must succeed");

    for (i, record) in records.iter().enumerate() {
        let prefix = format!("{}/", record.path);
        assert!(
            !records[i + 1..].iter().any(|r| r.path.starts_with(&prefix)),
            "{} recorded before its descendants",
            record.path
        );
    }

    let exported = export_all(block_service, records.last().unwrap().digest.clone())
        .await
        .expect("export must succeed");

    for (i, (path, _)) in exported.iter().enumerate().skip(1) {
        let (parent, _) = path.rsplit_once('/').expect("must have a parent");
        assert!(
            exported[..i]
                .iter()
                .any(|(p, content)| p == parent && content.is_none()),
            "{} exported before its parent",
            path
        );
    }
}

#[tokio::test]
async fn dedup() {
    let block_service = MemoryBlockService::default();
    let records = import_all(
        block_service.clone(),
        vec![
            ImportEntry::bytes("r/a/x", BEST_BYTES_CONTENTS),
            ImportEntry::bytes("r/b/x", BEST_BYTES_CONTENTS),
        ],
        ImportOptions::default(),
    )
    .await
    .expect("import must succeed");

    let digest_of = |path: &str| {
        records
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.digest.clone())
            .expect("record must exist")
    };

    assert_eq!(digest_of("r/a/x"), digest_of("r/b/x"));
    assert_eq!(digest_of("r/a"), digest_of("r/b"));
    // one file, one directory holding it, and "r"
    assert_eq!(3, block_service.len());
}

/// "a/b" holding "i have the best bytes".
#[tokio::test]
async fn single_nested_file() {
    let block_service = gen_block_service();
    let records = import_all(
        block_service.clone(),
        vec![ImportEntry::bytes("a/b", BEST_BYTES_CONTENTS)],
        ImportOptions::default(),
    )
    .await
    .expect("import must succeed");

    let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(vec!["a/b", "a"], paths);

    // a single node each
    let file = DagNode::new(
        NodeKind::inline_file(Bytes::from_static(BEST_BYTES_CONTENTS)),
        vec![],
    )
    .unwrap()
    .seal();
    assert_eq!(file.digest, records[0].digest);
    assert_eq!(file.data.len() as u64, records[0].size);

    let dir = block_service.get(&records[1].digest).await.unwrap().unwrap();
    assert_eq!(dir.len() as u64 + records[0].size, records[1].size);

    let root = records[1].digest.clone();
    let exported = export_all(block_service, root.clone())
        .await
        .expect("export must succeed");

    assert_eq!(
        vec![
            (root.to_string(), None),
            (format!("{}/b", root), Some(BEST_BYTES_CONTENTS.to_vec())),
        ],
        exported
    );
}

#[tokio::test]
async fn multi_block_file() {
    let block_service = gen_block_service();
    let records = import_all(
        block_service.clone(),
        vec![ImportEntry::bytes("big", BLOB_B.clone())],
        ImportOptions::default(),
    )
    .await
    .expect("import must succeed");

    assert_eq!(1, records.len());
    let root = block_service.get(&records[0].digest).await.unwrap().unwrap();
    let node = DagNode::decode(&root).expect("must decode");
    assert_eq!(4, node.links().len());
    assert_eq!(Some(BLOB_B.len() as u64), node.kind().file_size());
    assert_eq!(
        root.len() as u64 + node.links().iter().map(|l| l.size).sum::<u64>(),
        records[0].size
    );

    let exported = export_all(block_service, records[0].digest.clone())
        .await
        .expect("export must succeed");
    assert_eq!(vec![(records[0].digest.to_string(), Some(BLOB_B.to_vec()))], exported);
}

/// Every bucket of a sharded directory has one link per set bit, unnamed
/// links point to buckets, and named ones to the entries.
#[tokio::test]
async fn sharded_shape() {
    let block_service = gen_block_service();
    let entries = (0..40)
        .map(|i| ImportEntry::bytes(format!("dir/{}", i), format!("{}", i)))
        .collect();

    let records = import_all(
        block_service.clone(),
        entries,
        ImportOptions::default()
            .with_shard_split_threshold(4)
            .with_fanout(16),
    )
    .await
    .expect("import must succeed");

    let mut pending = vec![records.last().unwrap().digest.clone()];
    let mut buckets = 0;
    let mut names = Vec::new();

    while let Some(digest) = pending.pop() {
        let data = block_service.get(&digest).await.unwrap().unwrap();
        let node = DagNode::decode(&data).expect("must decode");

        match node.kind() {
            NodeKind::HamtShardedDirectory {
                fanout,
                hash_type,
                bitfield,
            } => {
                assert_eq!(16, *fanout);
                assert_eq!(Murmur3Hasher::HASH_TYPE, *hash_type);
                assert_eq!(popcount(bitfield), node.links().len());
            }
            kind => panic!("expected a bucket, got {:?}", kind),
        }
        buckets += 1;

        for link in node.links() {
            match &link.name {
                Some(name) => names.push(name.clone()),
                None => pending.push(link.digest.clone()),
            }
        }
    }

    // 40 names don't fit into 16 slots without collisions.
    assert!(buckets > 1);
    names.sort();
    let mut expected: Vec<_> = (0..40).map(|i| i.to_string()).collect();
    expected.sort();
    assert_eq!(expected, names);
}

#[tokio::test]
async fn wrap() {
    let block_service = gen_block_service();
    let records = import_all(
        block_service.clone(),
        vec![
            ImportEntry::bytes("a", HELLOWORLD_CONTENTS),
            ImportEntry::bytes("b", BEST_BYTES_CONTENTS),
        ],
        ImportOptions::default().with_wrap(true),
    )
    .await
    .expect("import must succeed");

    let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(vec!["a", "b", ""], paths);

    let exported = export_all(block_service, records[2].digest.clone())
        .await
        .expect("export must succeed");
    let expected: BTreeMap<_, _> = [
        ("".to_owned(), None),
        ("a".to_owned(), Some(HELLOWORLD_CONTENTS.to_vec())),
        ("b".to_owned(), Some(BEST_BYTES_CONTENTS.to_vec())),
    ]
    .into_iter()
    .collect();
    assert_eq!(expected, relative(exported));
}

#[tokio::test]
async fn empty_import() {
    let records = import_all(gen_block_service(), vec![], ImportOptions::default())
        .await
        .expect("import must succeed");
    assert!(records.is_empty());

    let records = import_all(gen_block_service(), vec![], ImportOptions::default().with_wrap(true))
        .await
        .expect("import must succeed");
    assert_eq!(1, records.len());
    assert_eq!("", records[0].path);
}
