// tests/integration/slice_test.rs

//! End-to-end tests of `BtreeSlice` on top of an in-memory serializer: durability across a
//! close/reopen cycle, the presence/CAS policy combinations `sarc` doesn't exercise in its
//! own unit tests, and the superblock-magic invariant surfacing through `get`.

use bytes::Bytes;
use latticedb::config::CacheConfig;
use latticedb::core::errors::LatticeError;
use latticedb::core::storage::{
    AddPolicy, AppendPrependKind, AppendPrependResult, BtreeSlice, CasTime, GetResult,
    MemorySerializer, ReplacePolicy, Serializer, SetResult, StoreKey,
};
use std::sync::Arc;

fn cfg() -> CacheConfig {
    CacheConfig {
        flush_interval_ms: 10,
        dirty_block_high_watermark: 1,
    }
}

fn key(s: &str) -> StoreKey {
    StoreKey::new(s.as_bytes().to_vec()).unwrap()
}

/// A value written, then the slice closed (flushing it), survives being reopened on the
/// very same serializer, the way a process restart would see whatever was last flushed.
#[tokio::test]
async fn data_persists_across_a_close_and_reopen_on_the_same_serializer() {
    let serializer = Arc::new(MemorySerializer::new());
    BtreeSlice::create(serializer.clone(), cfg()).await.unwrap();

    {
        let slice = BtreeSlice::new(serializer.clone(), cfg()).await.unwrap();
        slice
            .sarc(
                &key("durable"),
                Bytes::from_static(b"value"),
                0,
                0,
                CasTime::new(1, 1),
                AddPolicy::Unconditional,
                ReplacePolicy::Unconditional,
                None,
            )
            .await
            .unwrap();
        slice.close().await;
    }

    let reopened = BtreeSlice::new(serializer, cfg()).await.unwrap();
    match reopened.get(&key("durable")).await.unwrap() {
        GetResult::Found { data, .. } => assert_eq!(data, Bytes::from_static(b"value")),
        GetResult::NotFound => panic!("value written before close should survive reopen"),
    }
    reopened.close().await;
}

/// `add`'s presence policy rejects a key that's already present, independent of any CAS
/// value supplied.
#[tokio::test]
async fn add_policy_rejects_an_existing_key() {
    let serializer = Arc::new(MemorySerializer::new());
    BtreeSlice::create(serializer.clone(), cfg()).await.unwrap();
    let slice = BtreeSlice::new(serializer, cfg()).await.unwrap();

    slice
        .sarc(
            &key("x"),
            Bytes::from_static(b"first"),
            0,
            0,
            CasTime::new(1, 1),
            AddPolicy::Unconditional,
            ReplacePolicy::Unconditional,
            None,
        )
        .await
        .unwrap();

    let result = slice
        .sarc(
            &key("x"),
            Bytes::from_static(b"second"),
            0,
            0,
            CasTime::new(2, 2),
            AddPolicy::RequireAbsent,
            ReplacePolicy::Unconditional,
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, SetResult::NotStored);

    match slice.get(&key("x")).await.unwrap() {
        GetResult::Found { data, .. } => assert_eq!(data, Bytes::from_static(b"first")),
        GetResult::NotFound => panic!("the original value should be untouched"),
    }
    slice.close().await;
}

/// `replace`'s presence policy rejects a key that was never set.
#[tokio::test]
async fn replace_policy_rejects_a_missing_key() {
    let serializer = Arc::new(MemorySerializer::new());
    BtreeSlice::create(serializer.clone(), cfg()).await.unwrap();
    let slice = BtreeSlice::new(serializer, cfg()).await.unwrap();

    let result = slice
        .sarc(
            &key("never-set"),
            Bytes::from_static(b"v"),
            0,
            0,
            CasTime::new(1, 1),
            AddPolicy::Unconditional,
            ReplacePolicy::RequirePresent,
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, SetResult::NotFound);
    assert_eq!(slice.get(&key("never-set")).await.unwrap(), GetResult::NotFound);
    slice.close().await;
}

/// A CAS supplied against a key that doesn't exist at all is `NotFound`, not `Exists` --
/// there's nothing to compare against.
#[tokio::test]
async fn cas_against_a_missing_key_is_not_found() {
    let serializer = Arc::new(MemorySerializer::new());
    BtreeSlice::create(serializer.clone(), cfg()).await.unwrap();
    let slice = BtreeSlice::new(serializer, cfg()).await.unwrap();

    let result = slice
        .sarc(
            &key("ghost"),
            Bytes::from_static(b"v"),
            0,
            0,
            CasTime::new(1, 1),
            AddPolicy::Unconditional,
            ReplacePolicy::Unconditional,
            Some(CasTime::new(0, 999)),
        )
        .await
        .unwrap();
    assert_eq!(result, SetResult::NotFound);
    slice.close().await;
}

/// Append and prepend each extend the stored value on the correct side, and both fail
/// against a key that was never set.
#[tokio::test]
async fn append_and_prepend_extend_an_existing_value() {
    let serializer = Arc::new(MemorySerializer::new());
    BtreeSlice::create(serializer.clone(), cfg()).await.unwrap();
    let slice = BtreeSlice::new(serializer, cfg()).await.unwrap();

    let missing = slice
        .append_prepend(AppendPrependKind::Append, &key("k"), Bytes::from_static(b"x"), CasTime::new(1, 1))
        .await
        .unwrap();
    assert_eq!(missing, AppendPrependResult::NotStored);

    slice
        .sarc(
            &key("k"),
            Bytes::from_static(b"mid"),
            0,
            0,
            CasTime::new(1, 1),
            AddPolicy::Unconditional,
            ReplacePolicy::Unconditional,
            None,
        )
        .await
        .unwrap();

    slice
        .append_prepend(AppendPrependKind::Append, &key("k"), Bytes::from_static(b"-end"), CasTime::new(2, 2))
        .await
        .unwrap();
    slice
        .append_prepend(AppendPrependKind::Prepend, &key("k"), Bytes::from_static(b"start-"), CasTime::new(3, 3))
        .await
        .unwrap();

    match slice.get(&key("k")).await.unwrap() {
        GetResult::Found { data, .. } => assert_eq!(data, Bytes::from_static(b"start-mid-end")),
        GetResult::NotFound => panic!("expected the key to be present"),
    }
    slice.close().await;
}

/// A superblock with a corrupted magic is rejected rather than silently treated as empty,
/// the moment a read path decodes it.
#[tokio::test]
async fn corrupted_superblock_magic_surfaces_as_an_error() {
    let serializer = Arc::new(MemorySerializer::new());
    serializer
        .write(
            latticedb::core::storage::SUPERBLOCK_ID,
            Bytes::from_static(b"not a valid superblock!!"),
        )
        .await
        .unwrap();

    let slice = BtreeSlice::new(serializer, cfg()).await.unwrap();
    let err = slice.get(&key("anything")).await.unwrap_err();
    assert!(matches!(err, LatticeError::BadSuperblockMagic { .. }));
    slice.close().await;
}
