// src/core/storage/mod.rs

//! The storage slice core: a buffered B-tree keyspace backed by a write-back cache and a
//! block-addressable serializer.

pub mod block;
pub mod btree;
pub mod cache;
pub mod cas;
pub mod key;
pub mod serializer;
pub mod slice;
pub mod superblock;
pub mod transactor;

pub use block::{BlockId, NULL_BLOCK_ID, SUPERBLOCK_ID};
pub use cache::{BufLock, Cache, LockMode};
pub use cas::CasTime;
pub use key::StoreKey;
pub use serializer::{MemorySerializer, Serializer};
pub use slice::{
    AddPolicy, AppendPrependKind, AppendPrependResult, BtreeSlice, DeleteResult, GetResult,
    IncrDecrKind, IncrDecrResult, RgetBatch, ReplacePolicy, SetResult,
};
pub use superblock::SuperBlock;
pub use transactor::{Transactor, TxMode};
